use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// `GET /api/v1/config`: the running configuration, with secrets redacted.
pub async fn get_config(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": state.config.redacted()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::pipeline::tests::FakeTranscriber;
    use actix_web::{test, App};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_get_config_redacts_api_key() {
        let mut config = AppConfig::default();
        config.transcription.api_key = Some("top-secret".to_string());
        let state = AppState::new(config, Arc::new(FakeTranscriber::replying("")));

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/config", web::get().to(get_config)),
        )
        .await;

        let req = test::TestRequest::get().uri("/config").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["config"]["server"]["port"], 8080);
        assert_eq!(body["config"]["transcription"]["language"], "ja-JP");
        assert_eq!(body["config"]["transcription"]["api_key"], "***");
    }
}
