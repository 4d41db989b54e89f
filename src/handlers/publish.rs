//! `POST /publish`: out-of-band publishing for clients that are not attached.

use crate::{error::AppError, message::Message, state::AppState};
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use serde_json::json;

/// Publish the JSON candidate message in the request body.
///
/// Responds with the message actually broadcast and the number of subscribers it
/// went to:
/// ```json
/// {"message": {"body": {"type": "text", "content": "hi"}, "timestamp": "..."}, "n_publishers": 2}
/// ```
///
/// Bodies over `server.max_payload_bytes` are refused with a 413 error envelope.
pub async fn publish(
    state: web::Data<AppState>,
    mut payload: web::Payload,
) -> Result<HttpResponse, AppError> {
    let limit = state.config.server.max_payload_bytes;
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk
            .map_err(|e| AppError::MalformedMessage(format!("failed to read request body: {}", e)))?;
        if body.len() + chunk.len() > limit {
            return Err(AppError::PayloadTooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }

    let candidate: Message = serde_json::from_slice(&body)?;
    let published = state.publisher.publish(candidate).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": published.message,
        "n_publishers": published.n_publishers
    })))
}
