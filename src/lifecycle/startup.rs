//! Startup orchestration.
//!
//! # Responsibilities
//! - Load configuration (file or defaults), apply environment overrides
//! - Initialize logging, then the metrics registry
//! - Bind the listener last, so traffic only arrives when ready
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::loader::apply_overrides;
use crate::config::{load_config, validate_config, AppConfig, ConfigError};
use crate::observability::logging::{init_logging, Extra, Logger, LoggingError, LoggingGuard};
use crate::observability::metrics::{MetricsError, MetricsRegistry};

/// Error type for startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("logging: {0}")]
    Logging(#[from] LoggingError),
    #[error("metrics: {0}")]
    Metrics(#[from] MetricsError),
    #[error("cannot bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Everything the server needs, initialized in order.
pub struct Startup {
    pub config: AppConfig,
    pub metrics: Arc<MetricsRegistry>,
    pub listener: TcpListener,
    /// Held until exit so pending log records are flushed.
    pub logging: LoggingGuard,
}

/// Resolve the effective configuration: file or defaults, then environment, then validation.
pub fn resolve_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    resolve_with(path, |key| std::env::var(key).ok())
}

fn resolve_with(
    path: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    apply_overrides(&mut config, lookup);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

pub async fn start(config_path: Option<&Path>) -> Result<Startup, StartupError> {
    let config = resolve_config(config_path)?;
    let logging = init_logging(&config.logging)?;

    let metrics = Arc::new(MetricsRegistry::new()?);

    let address = config.listener.bind_address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;

    let mut extra = Extra::new();
    extra.insert("bind_address".into(), config.listener.bind_address.clone().into());
    extra.insert("request_timeout_secs".into(), config.timeouts.request_secs.into());
    extra.insert("metrics".into(), metrics.descriptors().len().into());
    Logger::info("Configuration loaded", &extra);

    Ok(Startup {
        config,
        metrics,
        listener,
        logging,
    })
}
