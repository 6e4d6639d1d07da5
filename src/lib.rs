//! HTTP replay output library.
//!
//! Re-issues captured HTTP requests against a target through an elastic pool
//! of senders, recording per-request results and optionally feeding the
//! replayed responses back to the caller.

pub mod analytics;
pub mod client;
pub mod config;
pub mod observability;
pub mod output;
pub mod payload;
pub mod sink;

pub use config::schema::{OutputConfig, ReplayConfig};
pub use output::{HttpOutput, OutputError};
