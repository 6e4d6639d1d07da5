//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities > 0, timeout > 0)
//! - Check the analytics endpoint names an index
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ReplayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::{OutputConfig, ReplayConfig};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("target address is empty")]
    EmptyTarget,

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("analytics endpoint {endpoint:?} is invalid: {reason}")]
    AnalyticsEndpoint { endpoint: String, reason: String },
}

/// Validate a full replay configuration.
pub fn validate_config(config: &ReplayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.target.trim().is_empty() {
        errors.push(ValidationError::EmptyTarget);
    }
    if let Err(mut output_errors) = validate_output(&config.output) {
        errors.append(&mut output_errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the output section on its own.
pub fn validate_output(config: &OutputConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let non_zero = [
        ("timeout_ms", config.timeout_ms as usize),
        ("response_buffer_size", config.response_buffer_size),
        ("queue_capacity", config.queue_capacity),
        ("result_queue_capacity", config.result_queue_capacity),
        ("response_queue_capacity", config.response_queue_capacity),
    ];
    for (field, value) in non_zero {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if let Some(endpoint) = &config.analytics_endpoint {
        if let Err(reason) = check_analytics_endpoint(endpoint) {
            errors.push(ValidationError::AnalyticsEndpoint {
                endpoint: endpoint.clone(),
                reason,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_analytics_endpoint(endpoint: &str) -> Result<(), String> {
    let url = Url::parse(endpoint).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme {}", url.scheme()));
    }
    let has_index = url
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()))
        .is_some();
    if !has_index {
        return Err("missing index path segment".to_string());
    }
    Ok(())
}
