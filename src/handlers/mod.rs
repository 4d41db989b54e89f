pub mod config;
pub mod publish;

pub use self::config::get_config;
pub use self::publish::publish;

use crate::{health, websocket};
use actix_web::web;

/// Register every route of the hub.
///
/// ## Routes:
/// - `GET /ws`: WebSocket subscriber endpoint
/// - `POST /publish`: publish a message over HTTP
/// - `GET /health`, `GET /api/v1/health`: liveness and hub counters
/// - `GET /api/v1/metrics`: per-endpoint request metrics
/// - `GET /api/v1/config`: running configuration (secrets redacted)
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws", web::get().to(websocket::subscribe))
        .route("/publish", web::post().to(publish))
        .service(
            web::scope("/api/v1")
                .route("/health", web::get().to(health::health_check))
                .route("/metrics", web::get().to(health::detailed_metrics))
                .route("/config", web::get().to(get_config)),
        )
        .route("/health", web::get().to(health::health_check));
}
