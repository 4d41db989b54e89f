//! # Broadcast Hub - Main Application Entry Point
//!
//! A realtime message broadcast hub. Clients attach over a WebSocket and receive
//! every message published to the hub, whether it came from another attached client
//! or from `POST /publish`. Voice messages are transcribed by Google Cloud
//! Speech-to-Text and broadcast as text.
//!
//! ## Application Architecture:
//! - **message**: Message, MessageBody and DataUrl value types
//! - **registry**: the live set of WebSocket subscribers and the broadcast fan-out
//! - **transcription**: the speech-to-text boundary and its Google implementation
//! - **pipeline**: stamping, transcription and broadcast of published messages
//! - **websocket**: one actor per attached subscriber
//! - **handlers**: HTTP routes (`/publish`, `/api/v1/config`) and route table
//! - **config**, **state**, **health**, **middleware**, **error**: ambient plumbing

mod config;
mod error;
mod handlers;
mod health;
mod message;
mod middleware;
mod pipeline;
mod registry;
mod state;
mod transcription;
mod websocket;

use crate::config::AppConfig;
use crate::state::AppState;
use crate::transcription::GoogleSpeechTranscriber;
use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging** for debugging and monitoring
/// 3. **Creates the hub**: registry, transcription adapter and publish pipeline
/// 4. **Configures the HTTP server** with middleware and routes
/// 5. **Handles graceful shutdown** on SIGINT/SIGTERM
#[actix_web::main]
async fn main() -> Result<()> {
    // It's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing();

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    if config.transcription.api_key.is_none() {
        warn!("No Speech-to-Text API key configured, voice messages will be rejected");
    }

    let transcriber = Arc::new(GoogleSpeechTranscriber::new(config.transcription.clone()));
    let app_state = AppState::new(config.clone(), transcriber);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::MetricsMiddleware)
            .wrap(TracingLogger::default())
            .configure(handlers::configure)
    })
    .disable_signals()
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize tracing.
///
/// `RUST_LOG` controls what gets logged; the default is
/// `broadcast_hub=debug,actix_web=info`.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "broadcast_hub=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve once SIGINT (Ctrl+C) or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
