//! Result sinks.
//!
//! # Data Flow
//! ```text
//! senders ──ResultRecord──▶ result queue (bounded, many producers)
//!                              │
//!                              ▼
//!                   serializer.rs (single consumer, blocking thread)
//!                              │ write_row + flush, one row at a time
//!                              ▼
//!                   ResultSink(s): tsv.rs, any pluggable store
//! ```
//!
//! # Design Decisions
//! - The serializer is the only owner of every sink, so rows never interleave
//! - Flush after every row; volume is bounded by the request rate
//! - A failing sink is logged and skipped, it never stalls the senders

pub mod serializer;
pub mod tsv;

use thiserror::Error;

pub use serializer::ResultSerializer;
pub use tsv::TsvSink;

/// Errors raised by a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink encoding error: {0}")]
    Csv(#[from] csv::Error),
}

/// Append-only row writer owned by the serializer.
pub trait ResultSink: Send {
    /// Append one row of fields.
    fn write_row(&mut self, row: &[String]) -> Result<(), SinkError>;

    /// Make every written row durable.
    fn flush(&mut self) -> Result<(), SinkError>;
}
