//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ReplayConfig (validated, immutable)
//!     → OutputConfig shared via Arc with the pool, senders and gates
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the output is built
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{ObservabilityConfig, OutputConfig, ReplayConfig};
pub use validation::ValidationError;
