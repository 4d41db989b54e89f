//! # Publish Pipeline
//!
//! Takes a candidate message from either ingress path (WebSocket frame or
//! `POST /publish`), stamps it, turns voice into text, and broadcasts the result.
//!
//! ## Algorithm:
//! 1. Overwrite the timestamp with the current UTC instant
//! 2. Text bodies pass through unchanged
//! 3. Voice bodies are decoded, transcribed, and replaced by a text body; the audio
//!    is dropped here and never broadcast
//! 4. The final message is serialized once and handed to the registry
//! 5. The message and the observed subscriber count go back to the caller
//!
//! If transcription fails, the error is returned and nothing is broadcast.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::message::{DataUrl, Message, MessageBody};
use crate::registry::ConnectionRegistry;
use crate::transcription::{Transcriber, TranscriptionError};

/// Outcome of a successful publish.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Published {
    /// The message that was actually broadcast
    pub message: Message,
    /// Subscribers registered when the broadcast ran
    pub n_publishers: usize,
}

/// Counters reported by the health and metrics endpoints.
#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct PublishStats {
    pub published: u64,
    pub transcribed: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    transcribed: AtomicU64,
    failed: AtomicU64,
}

/// Orchestrates publishing. Cheap to share behind an `Arc`.
pub struct Publisher {
    registry: Arc<ConnectionRegistry>,
    transcriber: Arc<dyn Transcriber>,
    transcription_timeout: Duration,
    counters: Counters,
}

impl Publisher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        transcriber: Arc<dyn Transcriber>,
        transcription_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            transcriber,
            transcription_timeout,
            counters: Counters::default(),
        }
    }

    #[cfg(test)]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Publish `candidate` to every attached subscriber.
    pub async fn publish(&self, candidate: Message) -> AppResult<Published> {
        let result = self.publish_inner(candidate).await;
        if let Err(err) = &result {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(error = %err, "Publish failed, nothing broadcast");
        }
        result
    }

    async fn publish_inner(&self, candidate: Message) -> AppResult<Published> {
        let timestamp = Some(Utc::now());
        debug!(kind = candidate.body.kind(), "Publishing message");

        let message = match candidate.body {
            MessageBody::Text(content) => Message {
                body: MessageBody::Text(content),
                timestamp,
            },
            MessageBody::Voice(audio) => {
                let transcript = self.transcribe(&audio).await?;
                Message {
                    body: MessageBody::Text(transcript),
                    timestamp,
                }
            }
        };

        let payload = serde_json::to_string(&message)
            .map_err(|e| AppError::Internal(format!("failed to serialize message: {}", e)))?;

        let n_publishers = self.registry.broadcast(&payload);
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        debug!("Publish message to {} subscribers", n_publishers);

        Ok(Published {
            message,
            n_publishers,
        })
    }

    async fn transcribe(&self, audio: &DataUrl) -> AppResult<String> {
        let started = Instant::now();
        let transcript = tokio::time::timeout(
            self.transcription_timeout,
            self.transcriber.transcribe(audio.as_bytes()),
        )
        .await
        .map_err(|_| TranscriptionError::Timeout(self.transcription_timeout))??;

        self.counters.transcribed.fetch_add(1, Ordering::Relaxed);
        info!(
            media_type = %audio.media_type(),
            bytes = audio.as_bytes().len(),
            chars = transcript.chars().count(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Voice message transcribed"
        );

        Ok(transcript)
    }

    pub fn stats(&self) -> PublishStats {
        PublishStats {
            published: self.counters.published.load(Ordering::Relaxed),
            transcribed: self.counters.transcribed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    /// Transcriber that answers with a fixed result and remembers what it was given.
    pub(crate) struct FakeTranscriber {
        pub(crate) reply: Result<String, fn() -> TranscriptionError>,
        pub(crate) delay: Option<Duration>,
        pub(crate) seen: Mutex<Vec<Vec<u8>>>,
    }

    impl FakeTranscriber {
        pub(crate) fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(err: fn() -> TranscriptionError) -> Self {
            Self {
                reply: Err(err),
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transcriber for FakeTranscriber {
        async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscriptionError> {
            self.seen.lock().push(audio.to_vec());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    fn publisher_with(transcriber: FakeTranscriber) -> (Publisher, Arc<FakeTranscriber>) {
        let transcriber = Arc::new(transcriber);
        let publisher = Publisher::new(
            Arc::new(ConnectionRegistry::new()),
            transcriber.clone(),
            Duration::from_secs(5),
        );
        (publisher, transcriber)
    }

    fn attach(publisher: &Publisher) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        publisher.registry().register(tx);
        rx
    }

    #[tokio::test]
    async fn test_text_message_passes_through_with_fresh_timestamp() {
        let (publisher, transcriber) = publisher_with(FakeTranscriber::replying("unused"));
        let mut rx = attach(&publisher);

        let mut candidate = Message::text("hi");
        let stale = "2000-01-01T00:00:00Z".parse().unwrap();
        candidate.timestamp = Some(stale);

        let before = Utc::now();
        let published = publisher.publish(candidate).await.unwrap();

        assert_eq!(published.message.body, MessageBody::Text("hi".to_string()));
        let stamped = published.message.timestamp.unwrap();
        assert!(stamped >= before);
        assert_ne!(stamped, stale);
        assert_eq!(published.n_publishers, 1);
        assert!(transcriber.seen.lock().is_empty());

        let frame: Message = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame, published.message);
    }

    #[tokio::test]
    async fn test_publish_with_no_subscribers() {
        let (publisher, _) = publisher_with(FakeTranscriber::replying("unused"));

        let candidate = Message::from_json(r#"{"body":{"type":"text","content":"hi"},"timestamp":null}"#)
            .unwrap();
        let published = publisher.publish(candidate).await.unwrap();

        assert_eq!(published.n_publishers, 0);
        assert!(published.message.timestamp.is_some());
        assert_eq!(publisher.stats().published, 1);
    }

    #[tokio::test]
    async fn test_voice_message_is_broadcast_as_transcript() {
        let (publisher, transcriber) = publisher_with(FakeTranscriber::replying("hello world"));
        let mut first = attach(&publisher);
        let mut second = attach(&publisher);

        let audio = vec![0x52, 0x49, 0x46, 0x46, 0x00, 0x01];
        let published = publisher
            .publish(Message::voice(DataUrl::from_bytes("audio/wav", &audio)))
            .await
            .unwrap();

        assert_eq!(published.message.body, MessageBody::Text("hello world".to_string()));
        assert!(published.message.timestamp.is_some());
        assert_eq!(published.n_publishers, 2);
        assert_eq!(transcriber.seen.lock().as_slice(), &[audio]);

        for rx in [&mut first, &mut second] {
            let frame = rx.try_recv().unwrap();
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(value["body"]["type"], "text");
            assert_eq!(value["body"]["content"], "hello world");
            assert!(!frame.contains("UklGRgAB"));
        }
        assert_eq!(publisher.stats().transcribed, 1);
    }

    #[tokio::test]
    async fn test_empty_transcript_is_still_broadcast() {
        let (publisher, _) = publisher_with(FakeTranscriber::replying(""));
        let mut rx = attach(&publisher);

        let published = publisher
            .publish(Message::voice(DataUrl::from_bytes("audio/wav", &[0; 32])))
            .await
            .unwrap();

        assert_eq!(published.message.body, MessageBody::Text(String::new()));
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_transcription_failure_broadcasts_nothing() {
        let (publisher, _) = publisher_with(FakeTranscriber::failing(|| {
            TranscriptionError::Unreachable("connection refused".to_string())
        }));
        let mut rx = attach(&publisher);

        let result = publisher
            .publish(Message::voice(DataUrl::from_bytes("audio/wav", &[1, 2, 3])))
            .await;

        assert!(matches!(
            result,
            Err(AppError::Transcription(TranscriptionError::Unreachable(_)))
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(publisher.stats().failed, 1);
        assert_eq!(publisher.stats().published, 0);
    }

    #[tokio::test]
    async fn test_slow_transcription_times_out() {
        let mut transcriber = FakeTranscriber::replying("too late");
        transcriber.delay = Some(Duration::from_secs(5));
        let transcriber = Arc::new(transcriber);

        let publisher = Publisher::new(
            Arc::new(ConnectionRegistry::new()),
            transcriber,
            Duration::from_millis(50),
        );
        let mut rx = attach(&publisher);

        let result = publisher
            .publish(Message::voice(DataUrl::from_bytes("audio/wav", &[1])))
            .await;

        assert!(matches!(
            result,
            Err(AppError::Transcription(TranscriptionError::Timeout(_)))
        ));
        assert!(rx.try_recv().is_err());
    }
}
