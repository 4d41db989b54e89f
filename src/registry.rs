//! # Connection Registry
//!
//! Tracks the live set of attached subscribers and fans serialized messages out to
//! them. The registry knows nothing about message content.
//!
//! ## Subscriber Lifecycle:
//! `ABSENT -> REGISTERED -> ABSENT`. A subscriber leaves when its connection closes,
//! when the transport fails, or when a delivery to it fails.
//!
//! ## Locking:
//! One `Mutex` guards the subscriber map. It is held only long enough to insert,
//! remove, or copy the current handles; delivery runs on the copy with the lock
//! released, and failed subscribers are removed after the loop.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Stable identity of one attached connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        SubscriberId(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single subscriber's send failed; its connection is already gone.
#[derive(Debug, Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryFailure(pub String);

/// Receive side of one attached connection.
pub trait Subscriber: Send + Sync {
    /// Hand `payload` to the connection without waiting for the network.
    fn deliver(&self, payload: &str) -> Result<(), DeliveryFailure>;
}

#[cfg(test)]
impl Subscriber for tokio::sync::mpsc::UnboundedSender<String> {
    fn deliver(&self, payload: &str) -> Result<(), DeliveryFailure> {
        self.send(payload.to_string())
            .map_err(|_| DeliveryFailure("receiver dropped".to_string()))
    }
}

/// The set of currently attached subscribers.
#[derive(Default)]
pub struct ConnectionRegistry {
    subscribers: Mutex<HashMap<SubscriberId, Arc<dyn Subscriber>>>,
    dropped: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber under a freshly minted id.
    pub fn register(&self, subscriber: impl Subscriber + 'static) -> SubscriberId {
        let id = SubscriberId::new();
        let count = {
            let mut subscribers = self.subscribers.lock();
            subscribers.insert(id, Arc::new(subscriber));
            subscribers.len()
        };

        debug!(subscriber_id = %id, subscribers = count, "Add subscriber");
        id
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unregister(&self, id: SubscriberId) {
        let removed = self.subscribers.lock().remove(&id).is_some();
        if removed {
            debug!(subscriber_id = %id, "Remove subscriber");
        }
    }

    /// Deliver `payload` to every subscriber and return how many there were.
    ///
    /// A failed delivery does not stop the loop; the failing subscriber is removed
    /// once every other subscriber has been tried.
    pub fn broadcast(&self, payload: &str) -> usize {
        let snapshot: Vec<(SubscriberId, Arc<dyn Subscriber>)> = self
            .subscribers
            .lock()
            .iter()
            .map(|(id, subscriber)| (*id, Arc::clone(subscriber)))
            .collect();

        let mut failed = Vec::new();
        for (id, subscriber) in &snapshot {
            if let Err(err) = subscriber.deliver(payload) {
                warn!(subscriber_id = %id, error = %err, "Dropping subscriber after failed delivery");
                failed.push(*id);
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.lock();
            for id in &failed {
                subscribers.remove(id);
            }
            self.dropped.fetch_add(failed.len() as u64, Ordering::Relaxed);
        }

        snapshot.len()
    }

    /// Number of currently registered subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Subscribers removed because a delivery to them failed, since startup.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
