//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Declare every service metric once, with fixed histogram buckets
//! - Offer typed recorders; callers never build metric objects
//! - Render the Prometheus text exposition for `GET /metrics`
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, route, status
//! - `http_request_duration_seconds` (histogram): latency distribution
//! - `http_request_size_bytes` / `http_response_size_bytes` (histograms)
//! - `cosmic_coffeehouse_*`: business counters, session/connection gauges,
//!   database latency and process resource gauges
//!
//! # Design Decisions
//! - One explicitly constructed registry, shared through an `Arc`; no global recorder
//! - Series updates are atomic inside the Prometheus recorder
//! - Label values are normalized; an empty value becomes `"unknown"`

use std::collections::HashSet;
use std::fmt::Write as _;
use std::time::Instant;

use arc_swap::ArcSwap;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{
    BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder,
};

use crate::observability::process;

pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_SIZE: &str = "http_request_size_bytes";
pub const HTTP_RESPONSE_SIZE: &str = "http_response_size_bytes";
pub const ORDERS_TOTAL: &str = "cosmic_coffeehouse_orders_total";
pub const PRODUCT_VIEWS_TOTAL: &str = "cosmic_coffeehouse_product_views_total";
pub const CART_ADDITIONS_TOTAL: &str = "cosmic_coffeehouse_cart_additions_total";
pub const USER_REGISTRATIONS_TOTAL: &str = "cosmic_coffeehouse_user_registrations_total";
pub const AUTH_ATTEMPTS_TOTAL: &str = "cosmic_coffeehouse_auth_attempts_total";
pub const ERRORS_TOTAL: &str = "cosmic_coffeehouse_errors_total";
pub const ACTIVE_SESSIONS: &str = "cosmic_coffeehouse_active_sessions";
pub const DATABASE_CONNECTIONS: &str = "cosmic_coffeehouse_database_connections_active";
pub const DATABASE_QUERY_DURATION: &str = "cosmic_coffeehouse_database_query_duration_seconds";
pub const CPU_USAGE: &str = "cosmic_coffeehouse_cpu_usage_percent";
pub const MEMORY_USAGE: &str = "cosmic_coffeehouse_memory_usage_bytes";
pub const PROCESS_UPTIME: &str = "cosmic_coffeehouse_process_uptime_seconds";

/// Fallback for missing or empty label values.
pub const UNKNOWN: &str = "unknown";

const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
const SIZE_BUCKETS: &[f64] = &[1.0, 100.0, 1_000.0, 10_000.0, 100_000.0, 1_000_000.0];
const DB_LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0];

/// Kind of a declared metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Histogram,
    Gauge,
}

impl MetricKind {
    /// Name used on the exposition `# TYPE` line.
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Histogram => "histogram",
            MetricKind::Gauge => "gauge",
        }
    }
}

/// Static declaration of one metric.
#[derive(Debug, Clone, Copy)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub kind: MetricKind,
    pub help: &'static str,
    pub label_names: &'static [&'static str],
    /// Upper bounds of the histogram buckets; `None` for other kinds.
    pub buckets: Option<&'static [f64]>,
}

impl MetricDescriptor {
    const fn counter(name: &'static str, help: &'static str, label_names: &'static [&'static str]) -> Self {
        Self { name, kind: MetricKind::Counter, help, label_names, buckets: None }
    }

    const fn gauge(name: &'static str, help: &'static str) -> Self {
        Self { name, kind: MetricKind::Gauge, help, label_names: &[], buckets: None }
    }

    const fn histogram(
        name: &'static str,
        help: &'static str,
        label_names: &'static [&'static str],
        buckets: &'static [f64],
    ) -> Self {
        Self { name, kind: MetricKind::Histogram, help, label_names, buckets: Some(buckets) }
    }
}

/// Every metric the service exposes.
pub const DESCRIPTORS: &[MetricDescriptor] = &[
    MetricDescriptor::histogram(
        HTTP_REQUEST_DURATION,
        "Duration of HTTP requests in seconds",
        &["method", "route", "status_code"],
        LATENCY_BUCKETS,
    ),
    MetricDescriptor::counter(
        HTTP_REQUESTS_TOTAL,
        "Total number of HTTP requests",
        &["method", "route", "status_code"],
    ),
    MetricDescriptor::histogram(
        HTTP_REQUEST_SIZE,
        "Size of HTTP requests in bytes",
        &["method", "route"],
        SIZE_BUCKETS,
    ),
    MetricDescriptor::histogram(
        HTTP_RESPONSE_SIZE,
        "Size of HTTP responses in bytes",
        &["method", "route"],
        SIZE_BUCKETS,
    ),
    MetricDescriptor::counter(ORDERS_TOTAL, "Total number of orders created", &["product_type", "user_type"]),
    MetricDescriptor::counter(
        PRODUCT_VIEWS_TOTAL,
        "Total number of product views",
        &["product_type", "product_id"],
    ),
    MetricDescriptor::counter(
        CART_ADDITIONS_TOTAL,
        "Total number of items added to cart",
        &["product_type", "user_type"],
    ),
    MetricDescriptor::counter(USER_REGISTRATIONS_TOTAL, "Total number of user registrations", &[]),
    MetricDescriptor::counter(
        AUTH_ATTEMPTS_TOTAL,
        "Total number of authentication attempts",
        &["method", "status"],
    ),
    MetricDescriptor::counter(ERRORS_TOTAL, "Total number of application errors", &["error_type", "severity"]),
    MetricDescriptor::gauge(ACTIVE_SESSIONS, "Number of active user sessions"),
    MetricDescriptor::gauge(DATABASE_CONNECTIONS, "Number of active database connections"),
    MetricDescriptor::histogram(
        DATABASE_QUERY_DURATION,
        "Duration of database queries in seconds",
        &["operation", "collection"],
        DB_LATENCY_BUCKETS,
    ),
    MetricDescriptor::gauge(CPU_USAGE, "Accumulated user+system CPU seconds (placeholder utilization)"),
    MetricDescriptor::gauge(MEMORY_USAGE, "Resident memory in bytes"),
    MetricDescriptor::gauge(PROCESS_UPTIME, "Seconds since the metrics registry was created"),
];

/// Error type for metric declaration.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metric '{0}' is declared more than once")]
    Duplicate(&'static str),
    #[error("histogram '{0}' is declared without buckets")]
    MissingBuckets(&'static str),
    #[error("invalid buckets for '{name}': {source}")]
    Buckets {
        name: &'static str,
        #[source]
        source: BuildError,
    },
}

/// A recorder with every descriptor declared on it.
struct Declared {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

fn declare(descriptors: &[MetricDescriptor]) -> Result<Declared, MetricsError> {
    let mut seen = HashSet::new();
    let mut builder = PrometheusBuilder::new();

    for descriptor in descriptors {
        if !seen.insert(descriptor.name) {
            return Err(MetricsError::Duplicate(descriptor.name));
        }
        if descriptor.kind == MetricKind::Histogram {
            let buckets = descriptor
                .buckets
                .ok_or(MetricsError::MissingBuckets(descriptor.name))?;
            builder = builder
                .set_buckets_for_metric(Matcher::Full(descriptor.name.to_string()), buckets)
                .map_err(|source| MetricsError::Buckets {
                    name: descriptor.name,
                    source,
                })?;
        }
    }

    let recorder = builder.build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        for descriptor in descriptors {
            match descriptor.kind {
                MetricKind::Counter => {
                    describe_counter!(descriptor.name, descriptor.help);
                    // Unlabeled series are exposed from the start.
                    if descriptor.label_names.is_empty() {
                        counter!(descriptor.name).absolute(0);
                    }
                }
                MetricKind::Gauge => {
                    describe_gauge!(descriptor.name, descriptor.help);
                    gauge!(descriptor.name).set(0.0);
                }
                MetricKind::Histogram => {
                    describe_histogram!(descriptor.name, descriptor.help);
                }
            }
        }
    });

    Ok(Declared { recorder, handle })
}

fn label(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        UNKNOWN.to_string()
    } else {
        value.to_string()
    }
}

/// Process-scoped metrics registry.
pub struct MetricsRegistry {
    descriptors: &'static [MetricDescriptor],
    current: ArcSwap<Declared>,
    started_at: Instant,
}

impl MetricsRegistry {
    /// Declare the service metrics. Fails on a malformed declaration table.
    pub fn new() -> Result<Self, MetricsError> {
        Self::with_descriptors(DESCRIPTORS)
    }

    pub fn with_descriptors(descriptors: &'static [MetricDescriptor]) -> Result<Self, MetricsError> {
        let declared = declare(descriptors)?;
        Ok(Self {
            descriptors,
            current: ArcSwap::from_pointee(declared),
            started_at: Instant::now(),
        })
    }

    pub fn descriptors(&self) -> &'static [MetricDescriptor] {
        self.descriptors
    }

    fn with_recorder<T>(&self, f: impl FnOnce() -> T) -> T {
        let declared = self.current.load();
        metrics::with_local_recorder(&declared.recorder, f)
    }

    /// Observe one finished HTTP exchange. Sizes of zero are not observed.
    pub fn record_http_request(
        &self,
        method: &str,
        route: &str,
        status_code: u16,
        duration_ms: f64,
        request_bytes: Option<u64>,
        response_bytes: Option<u64>,
    ) {
        let labels = [
            ("method", label(method)),
            ("route", label(route)),
            ("status_code", status_code.to_string()),
        ];
        let size_labels = [("method", label(method)), ("route", label(route))];

        self.with_recorder(|| {
            histogram!(HTTP_REQUEST_DURATION, &labels).record(duration_ms / 1000.0);
            counter!(HTTP_REQUESTS_TOTAL, &labels).increment(1);

            if let Some(bytes) = request_bytes.filter(|b| *b > 0) {
                histogram!(HTTP_REQUEST_SIZE, &size_labels).record(bytes as f64);
            }
            if let Some(bytes) = response_bytes.filter(|b| *b > 0) {
                histogram!(HTTP_RESPONSE_SIZE, &size_labels).record(bytes as f64);
            }
        });
    }

    pub fn record_order(&self, product_type: &str, user_type: &str) {
        let labels = [("product_type", label(product_type)), ("user_type", label(user_type))];
        self.with_recorder(|| counter!(ORDERS_TOTAL, &labels).increment(1));
    }

    pub fn record_product_view(&self, product_type: &str, product_id: &str) {
        let labels = [("product_type", label(product_type)), ("product_id", label(product_id))];
        self.with_recorder(|| counter!(PRODUCT_VIEWS_TOTAL, &labels).increment(1));
    }

    pub fn record_cart_addition(&self, product_type: &str, user_type: &str) {
        let labels = [("product_type", label(product_type)), ("user_type", label(user_type))];
        self.with_recorder(|| counter!(CART_ADDITIONS_TOTAL, &labels).increment(1));
    }

    pub fn record_user_registration(&self) {
        self.with_recorder(|| counter!(USER_REGISTRATIONS_TOTAL).increment(1));
    }

    pub fn record_authentication_attempt(&self, method: &str, status: &str) {
        let labels = [("method", label(method)), ("status", label(status))];
        self.with_recorder(|| counter!(AUTH_ATTEMPTS_TOTAL, &labels).increment(1));
    }

    pub fn record_error(&self, error_type: &str, severity: &str) {
        let labels = [("error_type", label(error_type)), ("severity", label(severity))];
        self.with_recorder(|| counter!(ERRORS_TOTAL, &labels).increment(1));
    }

    pub fn set_active_sessions(&self, count: u64) {
        self.with_recorder(|| gauge!(ACTIVE_SESSIONS).set(count as f64));
    }

    pub fn set_database_connections(&self, count: u64) {
        self.with_recorder(|| gauge!(DATABASE_CONNECTIONS).set(count as f64));
    }

    pub fn record_database_query(&self, operation: &str, collection: &str, duration_ms: f64) {
        let labels = [("operation", label(operation)), ("collection", label(collection))];
        self.with_recorder(|| histogram!(DATABASE_QUERY_DURATION, &labels).record(duration_ms / 1000.0));
    }

    fn refresh_process_gauges(&self) {
        let uptime = self.started_at.elapsed().as_secs_f64();
        let usage = process::sample();

        self.with_recorder(|| {
            gauge!(PROCESS_UPTIME).set(uptime);
            match usage {
                Ok(usage) => {
                    gauge!(CPU_USAGE).set(usage.cpu_gauge_value());
                    gauge!(MEMORY_USAGE).set(usage.resident_memory_bytes as f64);
                }
                Err(e) => tracing::warn!(error = %e, "Process sampling failed; keeping previous gauges"),
            }
        });
    }

    /// Prometheus text exposition of every declared metric, process gauges refreshed first.
    ///
    /// Metrics without any series yet are listed by their `# HELP` / `# TYPE` lines alone.
    pub fn snapshot(&self) -> String {
        self.refresh_process_gauges();
        let rendered = self.current.load().handle.render();

        let mut text = String::with_capacity(rendered.len());
        for descriptor in self.descriptors {
            if rendered.contains(&format!("# TYPE {} ", descriptor.name)) {
                continue;
            }
            let _ = writeln!(text, "# HELP {} {}", descriptor.name, descriptor.help);
            let _ = writeln!(text, "# TYPE {} {}\n", descriptor.name, descriptor.kind.as_str());
        }
        text.push_str(&rendered);
        text
    }

    /// Drop every series and declare the metrics again.
    #[cfg(test)]
    pub fn reset(&self) -> Result<(), MetricsError> {
        let declared = declare(self.descriptors)?;
        self.current.store(std::sync::Arc::new(declared));
        Ok(())
    }
}
