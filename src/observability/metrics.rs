//! Metrics collection and exposition.
//!
//! # Metrics
//! - `replay_requests_total` (counter): dispatches by status
//! - `replay_request_duration_seconds` (histogram): exchange latency
//! - `replay_active_workers` (gauge): live senders
//! - `replay_queue_depth` (gauge): pending queue depth, by queue
//! - `replay_dropped_payloads_total` (counter): dropped inputs, by reason
//! - `replay_scale_requests_total` (counter): scale-up signals posted
//!
//! # Design Decisions
//! - Recorder helpers are no-ops until `init_metrics` installs an exporter

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_dispatch(status: Option<u16>, duration: Duration) {
    let status = match status {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    };
    counter!("replay_requests_total", "status" => status).increment(1);
    histogram!("replay_request_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_active_workers(count: usize) {
    gauge!("replay_active_workers").set(count as f64);
}

pub fn record_dropped_payload(reason: &'static str) {
    counter!("replay_dropped_payloads_total", "reason" => reason).increment(1);
}

pub fn record_scale_request() {
    counter!("replay_scale_requests_total").increment(1);
}

/// Sink for queue depth observations.
pub trait QueueGauge: Send + Sync {
    fn report(&self, depth: usize);
}

/// Reports depth as the `replay_queue_depth{queue=...}` gauge.
#[derive(Debug, Clone)]
pub struct MetricsGauge {
    queue: &'static str,
}

impl MetricsGauge {
    pub fn new(queue: &'static str) -> Self {
        Self { queue }
    }
}

impl QueueGauge for MetricsGauge {
    fn report(&self, depth: usize) {
        gauge!("replay_queue_depth", "queue" => self.queue).set(depth as f64);
    }
}
