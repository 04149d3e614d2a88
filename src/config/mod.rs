//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (LOG_LEVEL / LOG_DIR / PORT overrides)
//!     → validation.rs (semantic checks, once, on the final values)
//!     → AppConfig (immutable, read once at startup)
//! ```
//!
//! # Design Decisions
//! - Config is read once; sinks and thresholds never change at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_env_overrides, load_config, parse_config, ConfigError};
pub use schema::{AppConfig, ListenerConfig, LoggingConfig, PipelineConfig, TimeoutConfig};
pub use validation::{validate_config, ValidationError};
