//! Request observing middleware.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use http_body::Body as _;
use serde_json::Value;

use crate::config::PipelineConfig;
use crate::observability::logging::{
    ApiMeta, AuthMeta, BusinessMeta, Extra, LogLevel, Logger, PerformanceMeta, SecurityMeta, Severity,
};
use crate::observability::metrics::MetricsRegistry;
use crate::pipeline::body::CountingBody;
use crate::pipeline::classifier::{classify, BusinessEvent};
use crate::pipeline::context::{AuthenticatedUser, HttpExchangeContext};
use crate::pipeline::security::SecurityInspector;

/// Status recorded when the client went away before the service answered.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Shared state of the observing middleware.
pub struct Pipeline {
    config: PipelineConfig,
    metrics: Arc<MetricsRegistry>,
    inspector: SecurityInspector,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            config,
            metrics,
            inspector: SecurityInspector::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    fn inspects_payloads(&self) -> bool {
        self.config.metrics || self.config.security || self.config.business
    }

    /// Entry-time stages: arrival log, payload inspection, auth audit.
    pub fn enter(&self, exchange: &HttpExchangeContext, body_hint: Option<&Value>) {
        if self.config.access_log {
            run_stage("access_log", || log_arrival(exchange));
        }
        if self.config.security {
            run_stage("security", || self.inspect(exchange, body_hint));
        }
    }

    /// Finish-time stages. Called exactly once per exchange.
    pub fn complete(&self, exchange: &HttpExchangeContext, body_hint: Option<&Value>) {
        let duration_ms = exchange.elapsed_ms();
        let status = exchange.status_code.unwrap_or(CLIENT_CLOSED_REQUEST);
        let event = classify(exchange, body_hint);

        if self.config.metrics {
            run_stage("metrics", || {
                self.record_metrics(exchange, status, duration_ms, event.as_ref())
            });
        }
        if self.config.access_log {
            run_stage("access_log", || {
                log_completion(exchange, status, duration_ms, self.config.slow_request_ms)
            });
        }
        if self.config.business && Logger::enabled(LogLevel::Info) {
            if let Some(event) = &event {
                run_stage("business", || log_business(exchange, event, body_hint));
            }
        }
    }

    fn inspect(&self, exchange: &HttpExchangeContext, body_hint: Option<&Value>) {
        if Logger::enabled(Severity::Medium.level()) {
            self.detect(exchange, body_hint);
        }
        if exchange.raw_path.contains("/auth/") && Logger::enabled(LogLevel::Info) {
            log_auth_attempt(exchange);
        }
    }

    fn detect(&self, exchange: &HttpExchangeContext, body_hint: Option<&Value>) {
        let blob = SecurityInspector::request_blob(body_hint, &exchange.query(), &exchange.path_params());

        if let Some(detector) = self.inspector.inspect(&blob, &exchange.url) {
            let mut meta = SecurityMeta {
                pattern: Some(detector.name.to_string()),
                method: Some(exchange.method.to_string()),
                url: Some(exchange.url.clone()),
                body: body_hint.map(Value::to_string),
                ip: Some(exchange.ip.clone()),
                user_agent: exchange.user_agent.clone(),
                ..Default::default()
            };
            meta.extra.insert("regex".into(), detector.pattern().into());
            Logger::security("Suspicious request pattern detected", Severity::Medium, &meta);
        }
    }

    fn record_metrics(
        &self,
        exchange: &HttpExchangeContext,
        status: u16,
        duration_ms: f64,
        event: Option<&BusinessEvent>,
    ) {
        self.metrics.record_http_request(
            exchange.method.as_str(),
            exchange.route_label(),
            status,
            duration_ms,
            exchange.request_bytes,
            Some(exchange.response_bytes),
        );

        if let Some(event) = event {
            event.record(&self.metrics);
        }

        if status >= 500 {
            self.metrics.record_error("server_error", "high");
        } else if status >= 400 {
            self.metrics.record_error("client_error", "medium");
        }
    }
}

fn log_auth_attempt(exchange: &HttpExchangeContext) {
    Logger::auth(
        &format!("Authentication attempt on {}", exchange.raw_path),
        None,
        &AuthMeta {
            method: Some(exchange.method.to_string()),
            path: Some(exchange.raw_path.clone()),
            ip: Some(exchange.ip.clone()),
            user_agent: exchange.user_agent.clone(),
            ..Default::default()
        },
    );
}

fn log_arrival(exchange: &HttpExchangeContext) {
    if !Logger::enabled(LogLevel::Http) {
        return;
    }
    let mut extra = Extra::new();
    extra.insert("method".into(), exchange.method.as_str().into());
    extra.insert("url".into(), exchange.url.clone().into());
    extra.insert("ip".into(), exchange.ip.clone().into());
    if let Some(user_agent) = &exchange.user_agent {
        extra.insert("user_agent".into(), user_agent.clone().into());
    }
    if let Some(request_id) = &exchange.request_id {
        extra.insert("request_id".into(), request_id.clone().into());
    }
    Logger::http(&format!("{} {}", exchange.method, exchange.raw_path), &extra);
}

fn log_completion(exchange: &HttpExchangeContext, status: u16, duration_ms: f64, slow_request_ms: u64) {
    let method = exchange.method.as_str();
    let path = exchange.raw_path.as_str();

    if Logger::enabled(LogLevel::Http) {
        Logger::api(
            method,
            path,
            status,
            duration_ms.round() as u64,
            &ApiMeta {
                request_id: exchange.request_id.clone(),
                user_agent: exchange.user_agent.clone(),
                ip: Some(exchange.ip.clone()),
                content_length: Some(exchange.response_bytes),
                ..Default::default()
            },
        );
    }

    if duration_ms > slow_request_ms as f64 && Logger::enabled(LogLevel::Info) {
        Logger::performance(
            "slow_request",
            duration_ms.round(),
            "ms",
            &PerformanceMeta {
                method: Some(method.to_string()),
                path: Some(path.to_string()),
                status_code: Some(status),
                ..Default::default()
            },
        );
    }

    if status >= 400 && Logger::enabled(LogLevel::Error) {
        let mut extra = Extra::new();
        extra.insert("method".into(), method.into());
        extra.insert("path".into(), path.into());
        extra.insert("status_code".into(), status.into());
        Logger::error(&format!("Request failed with status {}", status), &extra);
    }
}

fn log_business(exchange: &HttpExchangeContext, event: &BusinessEvent, body_hint: Option<&Value>) {
    // Guests adding to a cart are identified by their session.
    let session_id = match event {
        BusinessEvent::CartItemAdded { .. } => body_hint
            .and_then(|body| body.get("sessionId"))
            .and_then(Value::as_str),
        _ => None,
    };
    let product_id = match event {
        BusinessEvent::ProductViewed { product_id, .. } => Some(product_id.clone()),
        _ => None,
    };

    Logger::business(
        event.message(),
        &BusinessMeta {
            user_id: exchange.user_id().or(session_id).map(str::to_owned),
            product_type: event.product_type().map(|t| t.as_str().to_string()),
            product_id,
            user_type: Some(exchange.user_type().as_str().to_string()),
            ..Default::default()
        },
    );
}

/// Run one stage; a panic is logged and contained.
pub fn run_stage(stage: &'static str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        let mut extra = Extra::new();
        extra.insert("stage".into(), stage.into());
        extra.insert("reason".into(), panic_message(panic.as_ref()).into());
        Logger::error("Observability stage failed", &extra);
    }
}

/// Text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Exchange waiting for its response to be fully sent.
struct PendingExchange {
    pipeline: Arc<Pipeline>,
    exchange: HttpExchangeContext,
    body_hint: Option<Value>,
}

impl PendingExchange {
    /// Capture status and identity, then complete once the body is done.
    fn attach(mut self, response: Response) -> Response {
        let (parts, body) = response.into_parts();
        self.exchange.status_code = Some(parts.status.as_u16());
        if self.exchange.user.is_none() {
            self.exchange.user = parts.extensions.get::<AuthenticatedUser>().cloned();
        }

        let body = CountingBody::new(body, move |bytes| self.finish(bytes));
        Response::from_parts(parts, Body::new(body))
    }

    fn finish(mut self, response_bytes: u64) {
        self.exchange.response_bytes = response_bytes;
        self.pipeline
            .complete(&self.exchange, self.body_hint.as_ref());
    }
}

/// Completes the exchange when the inner service is cancelled mid-flight.
struct ExchangeGuard(Option<PendingExchange>);

impl ExchangeGuard {
    fn disarm(&mut self) -> Option<PendingExchange> {
        self.0.take()
    }
}

impl Drop for ExchangeGuard {
    fn drop(&mut self) {
        if let Some(pending) = self.0.take() {
            pending.finish(0);
        }
    }
}

fn parse_body(bytes: &Bytes) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    serde_json::from_slice(bytes)
        .ok()
        .or_else(|| std::str::from_utf8(bytes).ok().map(|text| Value::String(text.to_string())))
}

/// Buffer a bounded request body so it can be inspected and still reach the handler.
///
/// A body that fails to read is handed on empty and uninspected; the handler decides
/// what that request means.
async fn buffer_body(request: Request, limit: usize) -> (Request, Option<Bytes>) {
    let bounded = request
        .body()
        .size_hint()
        .upper()
        .is_some_and(|upper| upper <= limit as u64);
    if !bounded {
        return (request, None);
    }

    let (parts, body) = request.into_parts();
    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => (Request::from_parts(parts, Body::from(bytes.clone())), Some(bytes)),
        Err(e) => {
            let mut extra = Extra::new();
            extra.insert("error".into(), e.to_string().into());
            Logger::warn("Request body could not be read; forwarding without inspection", &extra);
            (Request::from_parts(parts, Body::empty()), None)
        }
    }
}

/// Axum middleware observing every exchange.
///
/// Install with `axum::middleware::from_fn_with_state(pipeline, observe)`.
pub async fn observe(State(pipeline): State<Arc<Pipeline>>, request: Request, next: Next) -> Response {
    let mut exchange = HttpExchangeContext::from_request(&request);

    let (request, payload) = if pipeline.inspects_payloads() {
        buffer_body(request, pipeline.config.max_inspect_bytes).await
    } else {
        (request, None)
    };

    if exchange.request_bytes.is_none() {
        exchange.request_bytes = payload.as_ref().map(|bytes| bytes.len() as u64);
    }
    let body_hint = payload.as_ref().and_then(parse_body);
    pipeline.enter(&exchange, body_hint.as_ref());

    let mut guard = ExchangeGuard(Some(PendingExchange {
        pipeline: pipeline.clone(),
        exchange,
        body_hint,
    }));
    let response = next.run(request).await;

    match guard.disarm() {
        Some(pending) => pending.attach(response),
        None => response,
    }
}
