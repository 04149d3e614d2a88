//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the log sinks (console, `error.log`, `combined.log`, `access.log`)
//! - Provide leveled and category-tagged emitters (`Logger`)
//! - Apply the configured level threshold before any formatting
//!
//! # Design Decisions
//! - Uses the tracing crate; `Logger` only adds a `category` field and typed
//!   per-category fields to plain tracing events
//! - Service levels map onto tracing levels preserving their order:
//!   error→ERROR, warn→WARN, info→INFO, http→DEBUG, debug→TRACE
//! - `http` records use the access target, which is what `access.log` selects
//! - Every file sink runs on its own non-blocking worker (single writer per file)

use std::fmt;
use std::fs;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::{filter_fn, LevelFilter},
    fmt::MakeWriter,
    layer::SubscriberExt,
    registry::LookupSpan,
    util::{SubscriberInitExt, TryInitError},
    Layer,
};

use crate::config::LoggingConfig;
use crate::observability::rotation::RotatingFileWriter;

/// Target of every non-HTTP record.
pub const LOG_TARGET: &str = "cosmic_coffeehouse";

/// Target of `http` level records; the only records `access.log` keeps.
pub const ACCESS_TARGET: &str = "cosmic_coffeehouse::access";

/// Free-form attributes attached to a record, rendered as one JSON object.
pub type Extra = serde_json::Map<String, Value>;

/// Service log levels, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Http,
    Debug,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Http,
        LogLevel::Debug,
    ];

    /// Position in the severity order (error = 0).
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Http => "http",
            LogLevel::Debug => "debug",
        }
    }

    /// Tracing filter that admits this level and everything more severe.
    pub fn level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Http => LevelFilter::DEBUG,
            LogLevel::Debug => LevelFilter::TRACE,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown log level '{}'", s))
    }
}

/// Domain tag carried by every record in the `category` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    General,
    Authentication,
    Api,
    Database,
    Security,
    Performance,
    Business,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::General => "general",
            Category::Authentication => "authentication",
            Category::Api => "api",
            Category::Database => "database",
            Category::Security => "security",
            Category::Performance => "performance",
            Category::Business => "business",
        }
    }
}

/// Severity of a security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// `critical` and `high` are errors, the rest warnings.
    pub fn level(self) -> LogLevel {
        match self {
            Severity::Critical | Severity::High => LogLevel::Error,
            Severity::Low | Severity::Medium => LogLevel::Warn,
        }
    }
}

/// Fields of an `auth` record.
#[derive(Debug, Clone, Default)]
pub struct AuthMeta {
    pub method: Option<String>,
    pub path: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub extra: Extra,
}

/// Fields of an `api` record.
#[derive(Debug, Clone, Default)]
pub struct ApiMeta {
    pub request_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub content_length: Option<u64>,
    pub extra: Extra,
}

/// Fields of a `database` record.
#[derive(Debug, Clone, Default)]
pub struct DatabaseMeta {
    pub query: Option<String>,
    pub result_count: Option<u64>,
    pub document_id: Option<String>,
    pub duration_ms: Option<f64>,
    pub extra: Extra,
}

/// Fields of a `security` record.
#[derive(Debug, Clone, Default)]
pub struct SecurityMeta {
    pub pattern: Option<String>,
    pub method: Option<String>,
    pub url: Option<String>,
    pub body: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub extra: Extra,
}

/// Fields of a `performance` record.
#[derive(Debug, Clone, Default)]
pub struct PerformanceMeta {
    pub method: Option<String>,
    pub path: Option<String>,
    pub status_code: Option<u16>,
    pub extra: Extra,
}

/// Fields of a `business` record.
#[derive(Debug, Clone, Default)]
pub struct BusinessMeta {
    pub user_id: Option<String>,
    pub product_type: Option<String>,
    pub product_id: Option<String>,
    pub user_type: Option<String>,
    pub extra: Extra,
}

/// Renders `Extra` as JSON only when the record is actually written.
struct JsonExtra<'a>(&'a Extra);

impl fmt::Display for JsonExtra<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self.0) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str("{}"),
        }
    }
}

fn extra_field(extra: &Extra) -> Option<tracing::field::DisplayValue<JsonExtra<'_>>> {
    (!extra.is_empty()).then(|| tracing::field::display(JsonExtra(extra)))
}

// Tracing callsites need a constant level, hence one arm per level.
macro_rules! emit {
    ($level:expr, $($rest:tt)+) => {
        match $level {
            LogLevel::Error => tracing::error!(target: LOG_TARGET, log_level = "error", $($rest)+),
            LogLevel::Warn => tracing::warn!(target: LOG_TARGET, log_level = "warn", $($rest)+),
            LogLevel::Info => tracing::info!(target: LOG_TARGET, log_level = "info", $($rest)+),
            LogLevel::Http => tracing::debug!(target: ACCESS_TARGET, log_level = "http", $($rest)+),
            LogLevel::Debug => tracing::trace!(target: LOG_TARGET, log_level = "debug", $($rest)+),
        }
    };
}

/// Leveled and category-tagged log emitters.
pub struct Logger;

impl Logger {
    /// Whether a record at `level` would be written by any sink.
    ///
    /// Callers gate expensive record building on this.
    pub fn enabled(level: LogLevel) -> bool {
        match level {
            LogLevel::Error => tracing::enabled!(target: LOG_TARGET, tracing::Level::ERROR),
            LogLevel::Warn => tracing::enabled!(target: LOG_TARGET, tracing::Level::WARN),
            LogLevel::Info => tracing::enabled!(target: LOG_TARGET, tracing::Level::INFO),
            LogLevel::Http => tracing::enabled!(target: ACCESS_TARGET, tracing::Level::DEBUG),
            LogLevel::Debug => tracing::enabled!(target: LOG_TARGET, tracing::Level::TRACE),
        }
    }

    pub fn log(level: LogLevel, message: &str, extra: &Extra) {
        emit!(
            level,
            category = Category::General.as_str(),
            extra = extra_field(extra),
            "{}",
            message
        );
    }

    pub fn error(message: &str, extra: &Extra) {
        Self::log(LogLevel::Error, message, extra);
    }

    pub fn warn(message: &str, extra: &Extra) {
        Self::log(LogLevel::Warn, message, extra);
    }

    pub fn info(message: &str, extra: &Extra) {
        Self::log(LogLevel::Info, message, extra);
    }

    pub fn http(message: &str, extra: &Extra) {
        Self::log(LogLevel::Http, message, extra);
    }

    pub fn debug(message: &str, extra: &Extra) {
        Self::log(LogLevel::Debug, message, extra);
    }

    pub fn auth(action: &str, user_id: Option<&str>, meta: &AuthMeta) {
        emit!(
            LogLevel::Info,
            category = Category::Authentication.as_str(),
            user_id = user_id,
            method = meta.method.as_deref(),
            path = meta.path.as_deref(),
            ip = meta.ip.as_deref(),
            user_agent = meta.user_agent.as_deref(),
            extra = extra_field(&meta.extra),
            "AUTH: {}",
            action
        );
    }

    pub fn api(method: &str, path: &str, status_code: u16, duration_ms: u64, meta: &ApiMeta) {
        emit!(
            LogLevel::Http,
            category = Category::Api.as_str(),
            method = method,
            path = path,
            status_code = status_code,
            duration_ms = duration_ms,
            request_id = meta.request_id.as_deref(),
            user_agent = meta.user_agent.as_deref(),
            ip = meta.ip.as_deref(),
            content_length = meta.content_length,
            extra = extra_field(&meta.extra),
            "API: {} {} - {} ({}ms)",
            method,
            path,
            status_code,
            duration_ms
        );
    }

    pub fn database(operation: &str, collection: &str, meta: &DatabaseMeta) {
        emit!(
            LogLevel::Info,
            category = Category::Database.as_str(),
            operation = operation,
            collection = collection,
            query = meta.query.as_deref(),
            result_count = meta.result_count,
            document_id = meta.document_id.as_deref(),
            duration_ms = meta.duration_ms,
            extra = extra_field(&meta.extra),
            "DB: {} on {}",
            operation,
            collection
        );
    }

    pub fn security(event: &str, severity: Severity, meta: &SecurityMeta) {
        emit!(
            severity.level(),
            category = Category::Security.as_str(),
            severity = severity.as_str(),
            pattern = meta.pattern.as_deref(),
            method = meta.method.as_deref(),
            url = meta.url.as_deref(),
            body = meta.body.as_deref(),
            ip = meta.ip.as_deref(),
            user_agent = meta.user_agent.as_deref(),
            extra = extra_field(&meta.extra),
            "SECURITY [{}]: {}",
            severity.as_str().to_uppercase(),
            event
        );
    }

    pub fn performance(metric: &str, value: f64, unit: &str, meta: &PerformanceMeta) {
        emit!(
            LogLevel::Info,
            category = Category::Performance.as_str(),
            metric = metric,
            value = value,
            unit = unit,
            method = meta.method.as_deref(),
            path = meta.path.as_deref(),
            status_code = meta.status_code,
            extra = extra_field(&meta.extra),
            "PERF: {} = {}{}",
            metric,
            value,
            unit
        );
    }

    pub fn business(event: &str, meta: &BusinessMeta) {
        emit!(
            LogLevel::Info,
            category = Category::Business.as_str(),
            event = event,
            user_id = meta.user_id.as_deref(),
            product_type = meta.product_type.as_deref(),
            product_id = meta.product_id.as_deref(),
            user_type = meta.user_type.as_deref(),
            extra = extra_field(&meta.extra),
            "BUSINESS: {}",
            event
        );
    }
}

/// Error type for logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("cannot prepare log sink: {0}")]
    Io(#[from] std::io::Error),
    #[error("global subscriber already installed: {0}")]
    Init(#[from] TryInitError),
}

/// Keeps the file sink workers alive; dropping it flushes pending records.
#[must_use = "dropping the guard stops the file sinks"]
pub struct LoggingGuard {
    _workers: Vec<WorkerGuard>,
}

/// JSON-lines layer used by every file sink.
pub fn json_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_ansi(false)
        .with_writer(writer)
}

/// Install the global subscriber with all configured sinks.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    fs::create_dir_all(&config.directory)?;

    let open = |name: &str| {
        RotatingFileWriter::open(
            config.directory.join(name),
            config.max_file_bytes,
            config.max_files,
        )
    };
    let (error_writer, error_guard) = tracing_appender::non_blocking(open("error.log")?);
    let (combined_writer, combined_guard) = tracing_appender::non_blocking(open("combined.log")?);
    let (access_writer, access_guard) = tracing_appender::non_blocking(open("access.log")?);

    let console = config
        .console
        .then(|| tracing_subscriber::fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(config.level.level_filter())
        .with(console)
        .with(json_layer(error_writer).with_filter(LevelFilter::ERROR))
        .with(json_layer(combined_writer))
        .with(json_layer(access_writer).with_filter(filter_fn(|meta| meta.target() == ACCESS_TARGET)))
        .try_init()?;

    let mut extra = Extra::new();
    extra.insert("level".into(), config.level.as_str().into());
    extra.insert("directory".into(), config.directory.display().to_string().into());
    Logger::info("Logging initialized", &extra);

    Ok(LoggingGuard {
        _workers: vec![error_guard, combined_guard, access_guard],
    })
}
