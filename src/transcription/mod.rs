//! # Transcription Module
//!
//! Boundary to the external speech-to-text collaborator. The publish pipeline only
//! sees the [`Transcriber`] trait: raw audio bytes in, transcript text out.
//!
//! ## Key Components:
//! - **Transcriber**: async `bytes -> text` contract
//! - **TranscriptionError**: every way the collaborator can fail
//! - **GoogleSpeechTranscriber**: Google Cloud Speech-to-Text REST implementation
//!
//! ## Result Semantics:
//! - `Ok("")` means the collaborator ran and heard no recognizable speech
//! - `Err(_)` means no transcript could be produced at all
//!
//! Callers rely on that distinction, so implementations must never turn a failure
//! into an empty transcript.

pub mod google;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use google::GoogleSpeechTranscriber;

/// Reasons a transcription could not be produced.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// The service could not be reached (DNS, TLS, connection reset, ...)
    #[error("Speech-to-Text service unreachable: {0}")]
    Unreachable(String),

    /// The API key is missing or was refused
    #[error("Speech-to-Text credential rejected: {0}")]
    Credential(String),

    /// The service refused the request, usually because of the audio format
    #[error("Speech-to-Text rejected the audio (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The service answered with something we could not read
    #[error("Unexpected Speech-to-Text response: {0}")]
    InvalidResponse(String),

    /// The call did not finish within the configured bound
    #[error("Speech-to-Text request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Speech-to-text collaborator.
///
/// Implementations own their client configuration (codec, sampling rate, language),
/// so the contract is just the audio.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe `audio` and return the concatenated best-alternative text.
    async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscriptionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = TranscriptionError::Rejected {
            status: 400,
            message: "bad encoding".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Speech-to-Text rejected the audio (HTTP 400): bad encoding"
        );

        let err = TranscriptionError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Speech-to-Text request timed out after 30s");
    }
}
