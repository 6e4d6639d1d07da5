//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the replay
//! output stage. All types derive Serde traits for deserialization from
//! config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the replay tool.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Destination the captured requests are re-issued against
    /// (e.g., "http://127.0.0.1:8080").
    pub target: String,

    /// Worker pool and output behaviour.
    pub output: OutputConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            target: "http://127.0.0.1:8080".to_string(),
            output: OutputConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Output stage configuration. Immutable once the output is built.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Fixed number of senders. 0 selects the dynamic pool.
    pub workers: usize,

    /// Maximum redirects followed per request.
    pub redirect_limit: usize,

    /// Per-request deadline in milliseconds.
    pub timeout_ms: u64,

    /// Keep the captured Host header instead of the target authority.
    pub preserve_original_host: bool,

    /// Maximum bytes of raw response kept per exchange.
    pub response_buffer_size: usize,

    /// Verbose payload logging.
    pub debug: bool,

    /// Emit a response record for every dispatched request.
    pub track_responses: bool,

    /// Report the pending queue depth to a gauge on every write.
    pub stats: bool,

    /// Optional analytics endpoint ("http://host:9200/index").
    pub analytics_endpoint: Option<String>,

    /// Capacity of the pending-request queue.
    pub queue_capacity: usize,

    /// Capacity of the result queue.
    pub result_queue_capacity: usize,

    /// Capacity of the response queue.
    pub response_queue_capacity: usize,

    /// Tab-separated result log. `None` disables the file sink.
    pub result_log: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            redirect_limit: 0,
            timeout_ms: 5_000,
            preserve_original_host: false,
            response_buffer_size: 100 * 1024,
            debug: false,
            track_responses: false,
            stats: false,
            analytics_endpoint: None,
            queue_capacity: 1_000,
            result_queue_capacity: 1_000,
            response_queue_capacity: 1_000,
            result_log: Some(PathBuf::from("result.tsv")),
        }
    }
}

impl OutputConfig {
    /// True when the pool grows and shrinks with load.
    pub fn is_dynamic(&self) -> bool {
        self.workers == 0
    }

    /// Per-request deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
