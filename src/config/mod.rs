//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CallwatchConfig (validated, immutable)
//!     → to_interceptor_config() → InterceptorConfig
//!     → shared by the interceptor for the life of the process
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; thresholds and names never change at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, parse_config, ConfigError};
pub use schema::{CallwatchConfig, ExporterConfig, LayerConfig, LogFormat, ObservabilityConfig};
pub use validation::{validate_config, ValidationError};
