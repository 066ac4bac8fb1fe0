//! # Application State Management
//!
//! Shared state handed to every HTTP handler and WebSocket actor: the
//! runtime-updatable configuration, service metrics, and the long-lived
//! protocol collaborators (media store, broadcast hub, processing pipeline,
//! chat registry).
//!
//! Mutable pieces sit behind `Arc<RwLock<…>>` — many concurrent readers,
//! one writer. The collaborators manage their own interior synchronization.

use crate::broadcast::BroadcastHub;
use crate::chat::ChatRegistry;
use crate::config::AppConfig;
use crate::processing::ProcessingPipeline;
use crate::protocol::TransactionOutcome;
use crate::storage::MediaStore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// State shared across all request handlers and connections.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime).
    pub config: Arc<RwLock<AppConfig>>,

    /// Service metrics, updated by middleware and the protocol layer.
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Artifact storage under the uploads root.
    pub store: Arc<MediaStore>,

    /// Observer fan-out hub.
    pub hub: Arc<BroadcastHub>,

    /// Collaborator pipeline with its serialization gate.
    pub pipeline: Arc<ProcessingPipeline>,

    /// Process-wide chat session registry.
    pub chat: Arc<ChatRegistry>,

    /// When the server started.
    pub start_time: Instant,
}

/// Metrics collected across HTTP requests and protocol transactions.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total HTTP requests processed since start.
    pub request_count: u64,

    /// Total HTTP errors since start.
    pub error_count: u64,

    /// Currently open media-exchange connections.
    pub active_connections: u32,

    /// Transactions that reached `Completed`.
    pub transactions_completed: u64,

    /// Transactions that ended in `Aborted`.
    pub transactions_aborted: u64,

    /// Per-endpoint statistics, keyed by "METHOD /path".
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
    pub fn new(
        config: AppConfig,
        store: Arc<MediaStore>,
        hub: Arc<BroadcastHub>,
        pipeline: Arc<ProcessingPipeline>,
        chat: Arc<ChatRegistry>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            store,
            hub,
            pipeline,
            chat,
            start_time: Instant::now(),
        }
    }

    /// Copy of the current configuration; the lock is released immediately.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validation.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn connection_opened(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_connections += 1;
    }

    pub fn connection_closed(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_connections > 0 {
            metrics.active_connections -= 1;
        }
    }

    /// Count a finished transaction under its terminal state.
    pub fn record_transaction(&self, outcome: TransactionOutcome) {
        let mut metrics = self.metrics.write().unwrap();
        match outcome {
            TransactionOutcome::Completed => metrics.transactions_completed += 1,
            TransactionOutcome::Aborted => metrics.transactions_aborted += 1,
        }
    }

    /// Consistent copy of the metrics for serialization.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_connections: metrics.active_connections,
            transactions_completed: metrics.transactions_completed,
            transactions_aborted: metrics.transactions_aborted,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
