//! # Error Handling
//!
//! Error types for the hub and how they turn into HTTP responses and WebSocket
//! error frames.
//!
//! ## Error Taxonomy:
//! - **MalformedMessage**: the candidate message broke the wire format (400)
//! - **Transcription**: the speech-to-text collaborator failed (502, or 504 on timeout)
//! - **PayloadTooLarge**: the request body or frame exceeded the configured limit (413)
//! - **Internal**: anything else that went wrong on our side (500)
//!
//! Per-subscriber delivery failures and closed connections never show up here. The
//! registry recovers from them locally by dropping the subscriber.
//!
//! ## JSON Error Format:
//! ```json
//! {
//!   "error": {
//!     "type": "transcription_error",
//!     "message": "Speech-to-Text request timed out after 30s",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

use crate::transcription::TranscriptionError;

/// Errors surfaced to whoever issued a publish (or a request).
#[derive(Debug)]
pub enum AppError {
    /// Inbound JSON did not satisfy the message invariants
    MalformedMessage(String),

    /// The transcription adapter could not produce a transcript
    Transcription(TranscriptionError),

    /// Request body or WebSocket frame over the configured size limit (bytes)
    PayloadTooLarge(usize),

    /// Server-side failures (serialization bugs and the like)
    Internal(String),
}

impl AppError {
    /// Machine-readable error type, shared by HTTP bodies and WebSocket error frames.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::MalformedMessage(_) => "malformed_message",
            AppError::Transcription(_) => "transcription_error",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// The JSON error envelope used on every surface.
    pub fn to_json(&self) -> serde_json::Value {
        let message = match self {
            AppError::MalformedMessage(msg) | AppError::Internal(msg) => msg.clone(),
            AppError::Transcription(err) => err.to_string(),
            AppError::PayloadTooLarge(limit) => {
                format!("message exceeds the {} byte limit", limit)
            }
        };

        json!({
            "error": {
                "type": self.error_type(),
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        })
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::MalformedMessage(msg) => write!(f, "Malformed message: {}", msg),
            AppError::Transcription(err) => write!(f, "Transcription failed: {}", err),
            AppError::PayloadTooLarge(limit) => {
                write!(f, "Payload too large: limit is {} bytes", limit)
            }
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Transcription(err) => Some(err),
            _ => None,
        }
    }
}

/// ## HTTP Status Code Mapping:
/// - MalformedMessage → 400 (Bad Request)
/// - Transcription → 502 (Bad Gateway), or 504 (Gateway Timeout) when the call expired
/// - PayloadTooLarge → 413 (Payload Too Large)
/// - Internal → 500 (Internal Server Error)
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::MalformedMessage(_) => StatusCode::BAD_REQUEST,
            AppError::Transcription(TranscriptionError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Transcription(_) => StatusCode::BAD_GATEWAY,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.to_json())
    }
}

impl From<TranscriptionError> for AppError {
    fn from(err: TranscriptionError) -> Self {
        AppError::Transcription(err)
    }
}

/// JSON parsing errors come from client input, so they are malformed messages.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::MalformedMessage(format!("JSON parsing error: {}", err))
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;
