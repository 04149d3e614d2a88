//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::observability::logging::LogLevel;

/// Root configuration for the Cosmic Coffeehouse API.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Log sinks and level threshold.
    pub logging: LoggingConfig,

    /// Request pipeline stage toggles and thresholds.
    pub pipeline: PipelineConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3001").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3001".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log sink configuration. Read once at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global level threshold (error, warn, info, http, debug).
    pub level: LogLevel,

    /// Directory holding `error.log`, `combined.log` and `access.log`.
    /// Created if absent.
    pub directory: PathBuf,

    /// Size ceiling of a single log file before it rotates.
    pub max_file_bytes: u64,

    /// Number of files kept per sink, the active one included.
    pub max_files: usize,

    /// Enable the colorized console sink.
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            directory: PathBuf::from("logs"),
            max_file_bytes: 5 * 1024 * 1024, // 5MB
            max_files: 5,
            console: true,
        }
    }
}

/// Request pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Record HTTP and business metrics.
    pub metrics: bool,

    /// Emit access log entries.
    pub access_log: bool,

    /// Scan requests for suspicious patterns and log auth attempts.
    pub security: bool,

    /// Emit business log entries for classified exchanges.
    pub business: bool,

    /// Requests slower than this emit a performance entry.
    pub slow_request_ms: u64,

    /// Largest request body buffered for inspection. Bigger or unsized
    /// bodies are streamed through uninspected.
    pub max_inspect_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            access_log: true,
            security: true,
            business: true,
            slow_request_ms: 1000,
            max_inspect_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}
