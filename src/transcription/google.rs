//! # Google Cloud Speech-to-Text Adapter
//!
//! Sends the whole audio clip to the synchronous `speech:recognize` REST method and
//! folds the response into one transcript.
//!
//! ## Request Shape:
//! ```json
//! {
//!   "config": {"encoding": "LINEAR16", "sampleRateHertz": 16000, "languageCode": "ja-JP"},
//!   "audio": {"content": "<base64 audio>"}
//! }
//! ```
//!
//! ## Response Handling:
//! - Each entry in `results` is one recognized segment
//! - Only the first alternative of a segment is used (the API orders them by confidence)
//! - Segments are concatenated in the order returned
//! - A response without `results` means no speech was recognized: empty transcript

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Transcriber, TranscriptionError};
use crate::config::{AudioCodec, TranscriptionConfig};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig<'a> {
    encoding: AudioCodec,
    sample_rate_hertz: u32,
    language_code: &'a str,
}

#[derive(Debug, Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Debug, Serialize)]
struct RecognizeRequest<'a> {
    config: RecognitionConfig<'a>,
    audio: RecognitionAudio,
}

#[derive(Debug, Default, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<SpeechRecognitionResult>,
}

#[derive(Debug, Deserialize)]
struct SpeechRecognitionResult {
    #[serde(default)]
    alternatives: Vec<SpeechRecognitionAlternative>,
}

#[derive(Debug, Deserialize)]
struct SpeechRecognitionAlternative {
    #[serde(default)]
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    /// Canonical code name, e.g. `INVALID_ARGUMENT`
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<ApiErrorInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorInfo {
    #[serde(default)]
    reason: Option<String>,
}

impl ApiErrorDetail {
    /// Google reports a bad API key as `400 INVALID_ARGUMENT` with reason `API_KEY_INVALID`.
    fn is_credential_problem(&self) -> bool {
        matches!(self.status.as_str(), "UNAUTHENTICATED" | "PERMISSION_DENIED")
            || self
                .details
                .iter()
                .any(|info| info.reason.as_deref() == Some("API_KEY_INVALID"))
    }
}

/// [`Transcriber`] backed by Google Cloud Speech-to-Text.
pub struct GoogleSpeechTranscriber {
    client: reqwest::Client,
    config: TranscriptionConfig,
}

impl GoogleSpeechTranscriber {
    pub fn new(config: TranscriptionConfig) -> Self {
        info!(
            codec = ?config.codec,
            sampling_rate_hz = config.sampling_rate_hz,
            language = %config.language,
            "Speech-to-Text adapter configured"
        );

        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn build_request<'a>(&'a self, audio: &[u8]) -> RecognizeRequest<'a> {
        RecognizeRequest {
            config: RecognitionConfig {
                encoding: self.config.codec,
                sample_rate_hertz: self.config.sampling_rate_hz,
                language_code: &self.config.language,
            },
            audio: RecognitionAudio {
                content: BASE64.encode(audio),
            },
        }
    }
}

/// Concatenate the best alternative of every segment.
fn collect_transcript(response: RecognizeResponse) -> String {
    response
        .results
        .into_iter()
        .filter_map(|result| result.alternatives.into_iter().next())
        .map(|alternative| alternative.transcript)
        .collect()
}

/// Map a non-success HTTP answer to the matching error kind.
fn classify_failure(status: StatusCode, body: &str) -> TranscriptionError {
    let (message, credential_problem) = match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => {
            let credential_problem = parsed.error.is_credential_problem();
            (parsed.error.message, credential_problem)
        }
        Err(_) => (body.trim().to_string(), false),
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TranscriptionError::Credential(message),
        _ if credential_problem => TranscriptionError::Credential(message),
        s if s.is_server_error() => {
            TranscriptionError::Unreachable(format!("HTTP {}: {}", s.as_u16(), message))
        }
        s => TranscriptionError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl Transcriber for GoogleSpeechTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscriptionError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| TranscriptionError::Credential("no API key configured".to_string()))?;

        let header = &audio[..audio.len().min(6)];
        info!(
            bytes = audio.len(),
            header = ?header,
            "[Speech-to-Text] submitting audio"
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("x-goog-api-key", api_key)
            .json(&self.build_request(audio))
            .send()
            .await
            .map_err(|e| TranscriptionError::Unreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TranscriptionError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        debug!(response = %body, "[Speech-to-Text] response");

        let parsed: RecognizeResponse = serde_json::from_str(&body)
            .map_err(|e| TranscriptionError::InvalidResponse(e.to_string()))?;

        if parsed.results.is_empty() {
            info!("[Speech-to-Text] no speech recognized");
        }

        Ok(collect_transcript(parsed))
    }
}
