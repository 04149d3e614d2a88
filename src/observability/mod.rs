//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request pipeline, collaborators, startup:
//!     → logging.rs (leveled, category-tagged tracing events)
//!         → console, error.log, combined.log, access.log
//!         → rotation.rs (size-bounded files)
//!     → metrics.rs (counters, gauges, histograms)
//!         → process.rs (CPU / memory sampled at scrape time)
//!     → database.rs (data-access log records + query latency)
//!
//! Consumers:
//!     → Log files and stdout
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON lines) for machine parsing
//! - Metrics are cheap (atomic increments inside the recorder)
//! - Observability never fails a request; sink errors go to stderr

pub mod database;
pub mod logging;
pub mod metrics;
pub mod process;
pub mod rotation;

pub use database::DatabaseObserver;
pub use logging::{init_logging, LogLevel, Logger, LoggingGuard};
pub use metrics::MetricsRegistry;
