//! Output stage errors.

use std::time::Duration;
use thiserror::Error;

use crate::analytics::AnalyticsError;
use crate::config::ValidationError;
use crate::sink::SinkError;

#[derive(Debug, Error)]
pub enum OutputError {
    /// Target address is not a usable `http` URL.
    #[error("invalid target address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Configuration failed validation.
    #[error("invalid output configuration: {}", join(.0))]
    Config(Vec<ValidationError>),

    /// The result log could not be opened.
    #[error("result sink error: {0}")]
    Sink(#[from] SinkError),

    /// The analytics collaborator could not be built.
    #[error("analytics error: {0}")]
    Analytics(#[from] AnalyticsError),

    /// The worker pool is gone.
    #[error("output is closed")]
    Closed,

    /// Read buffer cannot hold the framed response.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// In-flight work did not drain within the grace period.
    #[error("shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
