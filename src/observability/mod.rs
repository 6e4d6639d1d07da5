//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Intake gate, senders, pool manager produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms, queue depth gauge)
//!
//! Consumers:
//!     → stdout (tracing-subscriber fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;

pub use self::metrics::{MetricsGauge, QueueGauge};
