//! # Application State Management
//!
//! Shared state handed to every HTTP handler and WebSocket actor.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: Lets many handlers share ownership of one registry and one publisher
//! - **Memory safety**: The data is dropped when the last reference goes away
//!
//! ### Locks
//! - The subscriber map lives behind its own `Mutex` inside [`ConnectionRegistry`]
//! - Request metrics use an `RwLock`, written by the middleware and read by `/metrics`
//! - `parking_lot` locks do not poison, so there is no `unwrap()` on lock acquisition
//!
//! ## Why not a global:
//! The registry is created once in `main` and passed in through `AppState`, which
//! makes its lifetime explicit and lets tests build their own isolated hubs.

use crate::config::AppConfig;
use crate::pipeline::Publisher;
use crate::registry::ConnectionRegistry;
use crate::transcription::Transcriber;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// The main application state that's shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Configuration loaded at startup (read-only afterwards)
    pub config: Arc<AppConfig>,

    /// Live subscriber set
    pub registry: Arc<ConnectionRegistry>,

    /// Publish pipeline shared by the WebSocket and HTTP ingress paths
    pub publisher: Arc<Publisher>,

    /// Request metrics, updated by the metrics middleware on every request
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started (never changes)
    pub start_time: Instant,
}

/// Request metrics collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of error responses since server start
    pub error_count: u64,

    /// Key: endpoint name (e.g., "POST /publish")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for a specific endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    /// Build the state: one registry, one publisher wired to `transcriber`.
    pub fn new(config: AppConfig, transcriber: Arc<dyn Transcriber>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let publisher = Arc::new(Publisher::new(
            Arc::clone(&registry),
            transcriber,
            config.transcription.timeout(),
        ));

        Self {
            config: Arc::new(config),
            registry,
            publisher,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Record one finished request for `endpoint`.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write();
        metrics.request_count += 1;
        if is_error {
            metrics.error_count += 1;
        }

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Copy of the current metrics, so no lock is held while building a response.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average response time: total duration ÷ number of requests.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate from 0.0 (no errors) to 1.0 (every request failed).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
