use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let publish = state.publisher.stats();
    let config = &state.config;

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "hub": {
            "subscribers": state.registry.len(),
            "published": publish.published,
            "failed_publishes": publish.failed
        },
        "transcription": {
            "language": config.transcription.language,
            "codec": config.transcription.codec,
            "credential_configured": config.transcription.api_key.is_some()
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            }
        }
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats = Vec::new();
    for (endpoint, metric) in metrics.endpoint_metrics.iter() {
        endpoint_stats.push(json!({
            "endpoint": endpoint,
            "request_count": metric.request_count,
            "error_count": metric.error_count,
            "error_rate": metric.error_rate(),
            "average_duration_ms": metric.average_duration_ms(),
            "total_duration_ms": metric.total_duration_ms
        }));
    }

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "hub": {
            "subscribers": state.registry.len(),
            "dropped_subscribers": state.registry.dropped_count(),
            "publish": state.publisher.stats()
        },
        "endpoints": endpoint_stats
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::message::Message;
    use crate::middleware::MetricsMiddleware;
    use crate::pipeline::tests::FakeTranscriber;
    use actix_web::{test, App};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[actix_web::test]
    async fn test_health_reports_hub_counters() {
        let state = AppState::new(AppConfig::default(), Arc::new(FakeTranscriber::replying("")));
        let (tx, _rx) = mpsc::unbounded_channel::<String>();
        state.registry.register(tx);
        state.publisher.publish(Message::text("hi")).await.unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["hub"]["subscribers"], 1);
        assert_eq!(body["hub"]["published"], 1);
        assert_eq!(body["transcription"]["credential_configured"], false);
    }

    #[actix_web::test]
    async fn test_metrics_lists_recorded_endpoints() {
        let state = AppState::new(AppConfig::default(), Arc::new(FakeTranscriber::replying("")));

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .wrap(MetricsMiddleware)
                .route("/health", web::get().to(health_check))
                .route("/metrics", web::get().to(detailed_metrics)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["overall"]["total_requests"], 1);
        let endpoints = body["endpoints"].as_array().unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0]["endpoint"], "GET /health");
    }
}
