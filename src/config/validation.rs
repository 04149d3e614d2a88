//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges. Validation is a
//! pure function that reports every problem, not just the first.

use std::net::SocketAddr;

use crate::config::schema::AppConfig;

/// A single semantic problem in a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting all errors.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.logging.max_file_bytes == 0 {
        errors.push(ValidationError::new("logging.max_file_bytes", "must be greater than 0"));
    }

    if config.logging.max_files == 0 {
        errors.push(ValidationError::new("logging.max_files", "must keep at least one file"));
    }

    if config.logging.directory.as_os_str().is_empty() {
        errors.push(ValidationError::new("logging.directory", "must not be empty"));
    }

    if config.pipeline.slow_request_ms == 0 {
        errors.push(ValidationError::new("pipeline.slow_request_ms", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = AppConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.logging.max_files = 0;
        config.pipeline.slow_request_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["listener.bind_address", "logging.max_files", "pipeline.slow_request_ms"]
        );
    }
}
