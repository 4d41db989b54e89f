//! # Message Data Model
//!
//! Value types exchanged over the WebSocket and the `/publish` endpoint.
//!
//! ## Wire Format:
//! ```json
//! {
//!   "body": {
//!     "type": "text" | "voice",
//!     "content": "<string>" | {"media_type": "...", "encoding": "plain" | "base64", "data": "..."}
//!   },
//!   "timestamp": "2025-01-01T12:00:00Z" | null
//! }
//! ```
//!
//! ## Invariants:
//! - The `type` tag decides the shape of `content`. A text body with a data URL, or a
//!   voice body with a plain string, fails to deserialize.
//! - A [`DataUrl`] is validated when it is built, so decoding it can never fail later.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// How the `data` field of a [`DataUrl`] is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataUrlEncoding {
    Plain,
    Base64,
}

/// A binary payload carried as text, in the spirit of a browser `data:` URL.
///
/// ## Construction:
/// Use [`DataUrl::new`] or deserialize one. Both routes check that `data` is valid
/// for `encoding` and keep the decoded bytes, which is why [`DataUrl::as_bytes`]
/// returns a plain slice instead of a `Result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDataUrl", into = "RawDataUrl")]
pub struct DataUrl {
    media_type: String,
    encoding: DataUrlEncoding,
    data: String,
    bytes: Vec<u8>,
}

/// Unvalidated wire shape of a [`DataUrl`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawDataUrl {
    media_type: String,
    encoding: DataUrlEncoding,
    data: String,
}

impl DataUrl {
    /// Build a data URL, rejecting `data` that does not match `encoding`.
    pub fn new(
        media_type: impl Into<String>,
        encoding: DataUrlEncoding,
        data: impl Into<String>,
    ) -> Result<Self, AppError> {
        let data = data.into();
        let bytes = match encoding {
            DataUrlEncoding::Plain => data.as_bytes().to_vec(),
            DataUrlEncoding::Base64 => BASE64
                .decode(data.as_bytes())
                .map_err(|e| AppError::MalformedMessage(format!("invalid base64 data: {}", e)))?,
        };

        Ok(Self {
            media_type: media_type.into(),
            encoding,
            data,
            bytes,
        })
    }

    /// Wrap raw bytes as a base64 data URL.
    #[cfg(test)]
    pub fn from_bytes(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            encoding: DataUrlEncoding::Base64,
            data: BASE64.encode(bytes),
            bytes: bytes.to_vec(),
        }
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// The decoded payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl TryFrom<RawDataUrl> for DataUrl {
    type Error = AppError;

    fn try_from(raw: RawDataUrl) -> Result<Self, Self::Error> {
        DataUrl::new(raw.media_type, raw.encoding, raw.data)
    }
}

impl From<DataUrl> for RawDataUrl {
    fn from(url: DataUrl) -> Self {
        RawDataUrl {
            media_type: url.media_type,
            encoding: url.encoding,
            data: url.data,
        }
    }
}

/// Message payload. The variant is the wire `type`, its field is the wire `content`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum MessageBody {
    Text(String),
    Voice(DataUrl),
}

impl MessageBody {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::Text(_) => "text",
            MessageBody::Voice(_) => "voice",
        }
    }
}

/// A message as published to, and broadcast by, the hub.
///
/// `timestamp` is assigned by the publish pipeline; whatever the sender supplies is
/// overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub body: MessageBody,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    #[cfg(test)]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            body: MessageBody::Text(content.into()),
            timestamp: None,
        }
    }

    #[cfg(test)]
    pub fn voice(audio: DataUrl) -> Self {
        Self {
            body: MessageBody::Voice(audio),
            timestamp: None,
        }
    }

    /// Parse a candidate message from JSON, reporting any failure as malformed input.
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        serde_json::from_str(json).map_err(|e| AppError::MalformedMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_data_url_decodes_to_utf8() {
        let url = DataUrl::new("text/plain", DataUrlEncoding::Plain, "héllo").unwrap();
        assert_eq!(url.as_bytes(), "héllo".as_bytes());
    }

    #[test]
    fn test_base64_data_url_decodes_original_bytes() {
        let audio: Vec<u8> = (0..=255u8).collect();
        let encoded = BASE64.encode(&audio);

        let url = DataUrl::new("audio/wav", DataUrlEncoding::Base64, encoded).unwrap();
        assert_eq!(url.as_bytes(), audio.as_slice());

        let empty = DataUrl::new("audio/wav", DataUrlEncoding::Base64, "").unwrap();
        assert!(empty.as_bytes().is_empty());
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let result = DataUrl::new("audio/wav", DataUrlEncoding::Base64, "not base64!!");
        assert!(matches!(result, Err(AppError::MalformedMessage(_))));
    }

    #[test]
    fn test_parse_text_message() {
        let msg = Message::from_json(r#"{"body":{"type":"text","content":"hi"},"timestamp":null}"#)
            .unwrap();
        assert_eq!(msg.body, MessageBody::Text("hi".to_string()));
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn test_parse_voice_message() {
        let json = r#"{
            "body": {
                "type": "voice",
                "content": {"media_type": "audio/wav", "encoding": "base64", "data": "AAEC"}
            }
        }"#;

        let msg = Message::from_json(json).unwrap();
        match msg.body {
            MessageBody::Voice(url) => {
                assert_eq!(url.media_type(), "audio/wav");
                assert_eq!(url.as_bytes(), &[0u8, 1, 2]);
            }
            other => panic!("Expected voice body, got {:?}", other),
        }
    }

    #[test]
    fn test_type_and_content_shape_must_agree() {
        let text_with_url = r#"{"body":{"type":"text","content":{"media_type":"a","encoding":"plain","data":"x"}},"timestamp":null}"#;
        let voice_with_string = r#"{"body":{"type":"voice","content":"hi"},"timestamp":null}"#;
        let unknown_type = r#"{"body":{"type":"video","content":"hi"},"timestamp":null}"#;

        for json in [text_with_url, voice_with_string, unknown_type] {
            assert!(
                matches!(Message::from_json(json), Err(AppError::MalformedMessage(_))),
                "accepted {}",
                json
            );
        }
    }

    #[test]
    fn test_voice_message_with_bad_base64_is_malformed() {
        let json = r#"{"body":{"type":"voice","content":{"media_type":"audio/wav","encoding":"base64","data":"%%%"}},"timestamp":null}"#;
        assert!(matches!(Message::from_json(json), Err(AppError::MalformedMessage(_))));
    }

    #[test]
    fn test_serialized_text_message_matches_wire_format() {
        let mut msg = Message::text("hello");
        msg.timestamp = Some("2025-01-01T12:00:00Z".parse().unwrap());

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["body"]["type"], "text");
        assert_eq!(value["body"]["content"], "hello");
        assert_eq!(value["timestamp"], "2025-01-01T12:00:00Z");
    }

    #[test]
    fn test_serialized_data_url_omits_decoded_bytes() {
        let url = DataUrl::from_bytes("audio/wav", &[1, 2, 3]);
        let value = serde_json::to_value(&url).unwrap();

        assert_eq!(value["encoding"], "base64");
        assert_eq!(value["data"], "AQID");
        assert!(value.get("bytes").is_none());
    }
}
