//! # Configuration Management
//!
//! This module handles loading application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Platform variables (`HOST`, `PORT`, `GOOGLE_API_KEY`)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_TRANSCRIPTION__LANGUAGE`, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Nested keys are separated by a double underscore so that field names with
//! underscores (`sampling_rate_hz`) survive the mapping.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub transcription: TranscriptionConfig,
    pub websocket: WebSocketConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest `POST /publish` body accepted, in bytes
    pub max_payload_bytes: usize,
}

/// Audio encodings understood by the Speech-to-Text API.
///
/// Serialized with the API's own names (`LINEAR16`, `FLAC`, ...), so the value can be
/// written straight into a recognition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioCodec {
    /// Uncompressed 16-bit signed little-endian samples (audio/wav)
    Linear16,
    Flac,
    Mulaw,
    Amr,
    AmrWb,
    OggOpus,
    WebmOpus,
    SpeexWithHeaderByte,
}

/// Settings for the speech-to-text collaborator.
///
/// ## Fields:
/// - `endpoint`: Recognize URL of the Speech-to-Text REST API
/// - `api_key`: API key sent with every request (never echoed by `/api/v1/config`)
/// - `codec`, `sampling_rate_hz`, `language`: how the submitted audio is described
/// - `timeout_secs`: upper bound for one transcription call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub codec: AudioCodec,
    pub sampling_rate_hz: u32,
    /// BCP-47 language tag, e.g. `en-US` or `ja-JP`
    pub language: String,
    pub timeout_secs: u64,
}

impl TranscriptionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// WebSocket keep-alive settings.
///
/// A ping goes out every `heartbeat_interval_secs`; a client that has not answered
/// anything for `client_timeout_secs` is disconnected.
///
/// `max_frame_bytes` bounds one inbound frame; voice frames carry base64 audio.
/// `mailbox_capacity` bounds how many broadcasts may queue for one connection before
/// it is dropped as too slow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
    pub max_frame_bytes: usize,
    pub mailbox_capacity: usize,
}

impl WebSocketConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                max_payload_bytes: 16 * 1024 * 1024, // 16 MiB
            },
            transcription: TranscriptionConfig {
                endpoint: "https://speech.googleapis.com/v1/speech:recognize".to_string(),
                api_key: None,
                codec: AudioCodec::Linear16, // audio/wav
                sampling_rate_hz: 16000,     // 16 kHz
                language: "ja-JP".to_string(),
                timeout_secs: 30,
            },
            websocket: WebSocketConfig {
                heartbeat_interval_secs: 30,
                client_timeout_secs: 60,
                max_frame_bytes: 16 * 1024 * 1024,
                mailbox_capacity: 256,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_TRANSCRIPTION__LANGUAGE=en-US`: Override recognition language
    /// - `APP_TRANSCRIPTION__SAMPLING_RATE_HZ=48000`: Override sampling rate
    /// - `HOST` / `PORT`: Special cases for deployment platforms
    /// - `GOOGLE_API_KEY`: Speech-to-Text API key
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(api_key) = env::var("GOOGLE_API_KEY") {
            settings = settings.set_override("transcription.api_key", api_key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.max_payload_bytes == 0 {
            return Err(anyhow::anyhow!("Maximum payload size must be greater than 0"));
        }

        if self.transcription.sampling_rate_hz == 0 {
            return Err(anyhow::anyhow!("Sampling rate must be greater than 0"));
        }

        if self.transcription.language.trim().is_empty() {
            return Err(anyhow::anyhow!("Transcription language must not be empty"));
        }

        if self.transcription.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Transcription timeout must be greater than 0"));
        }

        if self.websocket.heartbeat_interval_secs == 0 {
            return Err(anyhow::anyhow!("Heartbeat interval must be greater than 0"));
        }

        if self.websocket.client_timeout_secs <= self.websocket.heartbeat_interval_secs {
            return Err(anyhow::anyhow!(
                "Client timeout ({}s) must be longer than the heartbeat interval ({}s)",
                self.websocket.client_timeout_secs,
                self.websocket.heartbeat_interval_secs
            ));
        }

        if self.websocket.max_frame_bytes == 0 {
            return Err(anyhow::anyhow!("Maximum WebSocket frame size must be greater than 0"));
        }

        if self.websocket.mailbox_capacity == 0 {
            return Err(anyhow::anyhow!("WebSocket mailbox capacity must be greater than 0"));
        }

        Ok(())
    }

    /// Configuration as JSON with secrets replaced, for the `/api/v1/config` endpoint.
    pub fn redacted(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(key) = value.pointer_mut("/transcription/api_key") {
            if !key.is_null() {
                *key = serde_json::Value::String("***".to_string());
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.transcription.codec, AudioCodec::Linear16);
        assert_eq!(config.transcription.sampling_rate_hz, 16000);
        assert!(config.server.max_payload_bytes > 256 * 1024);
        assert!(config.websocket.max_frame_bytes > 64 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.transcription.language = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.websocket.client_timeout_secs = config.websocket.heartbeat_interval_secs;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.max_payload_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.websocket.max_frame_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.websocket.mailbox_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_codec_uses_api_names() {
        assert_eq!(serde_json::to_value(AudioCodec::Linear16).unwrap(), "LINEAR16");
        assert_eq!(serde_json::to_value(AudioCodec::OggOpus).unwrap(), "OGG_OPUS");
        let codec: AudioCodec = serde_json::from_str("\"WEBM_OPUS\"").unwrap();
        assert_eq!(codec, AudioCodec::WebmOpus);
    }

    #[test]
    fn test_redacted_hides_api_key() {
        let mut config = AppConfig::default();
        config.transcription.api_key = Some("secret-key".to_string());

        let value = config.redacted();
        assert_eq!(value["transcription"]["api_key"], "***");
        assert!(!value.to_string().contains("secret-key"));

        let value = AppConfig::default().redacted();
        assert!(value["transcription"]["api_key"].is_null());
    }
}
