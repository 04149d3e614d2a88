//! Database operation observer for data-access collaborators.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::observability::logging::{DatabaseMeta, Logger};
use crate::observability::metrics::MetricsRegistry;

/// Emits `database` log records and feeds the query latency histogram.
#[derive(Clone)]
pub struct DatabaseObserver {
    metrics: Arc<MetricsRegistry>,
}

impl DatabaseObserver {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self { metrics }
    }

    pub fn log_find(&self, collection: &str, query: &Value, result_count: Option<u64>) {
        Logger::database(
            "FIND",
            collection,
            &DatabaseMeta {
                query: Some(query.to_string()),
                result_count,
                ..Default::default()
            },
        );
    }

    pub fn log_insert(&self, collection: &str, document_id: Option<&str>) {
        let mut meta = DatabaseMeta {
            document_id: document_id.map(str::to_owned),
            ..Default::default()
        };
        meta.extra.insert("document_type".into(), collection.into());
        Logger::database("INSERT", collection, &meta);
    }

    pub fn log_update(&self, collection: &str, query: &Value, update: &Value) {
        let mut meta = DatabaseMeta {
            query: Some(query.to_string()),
            ..Default::default()
        };
        meta.extra.insert("update".into(), update.to_string().into());
        Logger::database("UPDATE", collection, &meta);
    }

    pub fn log_delete(&self, collection: &str, query: &Value) {
        Logger::database(
            "DELETE",
            collection,
            &DatabaseMeta {
                query: Some(query.to_string()),
                ..Default::default()
            },
        );
    }

    /// Run `query`, then record its latency under `operation`/`collection`.
    pub async fn timed<F, T>(&self, operation: &str, collection: &str, query: F) -> T
    where
        F: Future<Output = T>,
    {
        let start = Instant::now();
        let output = query.await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        self.metrics
            .record_database_query(&operation.to_lowercase(), collection, duration_ms);
        Logger::database(
            &operation.to_uppercase(),
            collection,
            &DatabaseMeta {
                duration_ms: Some(duration_ms),
                ..Default::default()
            },
        );
        output
    }
}
