//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt;

use cosmic_coffeehouse::config::AppConfig;
use cosmic_coffeehouse::http::HttpServer;
use cosmic_coffeehouse::observability::logging::{json_layer, LogLevel};
use cosmic_coffeehouse::observability::MetricsRegistry;
use cosmic_coffeehouse::pipeline::AuthenticatedUser;

/// Value of the first series named `name` carrying every `labels` pair.
pub fn sample(text: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    text.lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.rsplit_once(' '))
        .find(|(series, _)| {
            let name_matches = *series == name || series.starts_with(&format!("{}{{", name));
            name_matches
                && labels
                    .iter()
                    .all(|(k, v)| series.contains(&format!("{}=\"{}\"", k, v)))
        })
        .and_then(|(_, value)| value.parse().ok())
}

/// In-memory sink for JSON log records.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    pub fn records(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    pub fn with_category(&self, category: &str) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|r| r["category"] == category)
            .collect()
    }

    pub fn with_message(&self, message: &str) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|r| r["message"] == message)
            .collect()
    }
}

/// Capture records on the current thread until the guard is dropped.
///
/// `#[tokio::test]` runs on a current-thread runtime, so handler tasks log here too.
pub fn capture_logs(threshold: LogLevel) -> (LogCapture, DefaultGuard) {
    let sink = LogCapture::default();
    let writer = sink.clone();
    let subscriber = tracing_subscriber::registry()
        .with(threshold.level_filter())
        .with(json_layer(move || writer.clone()));
    (sink, tracing::subscriber::set_default(subscriber))
}

/// Stand-ins for the catalog, cart, order and auth collaborators.
pub fn collaborator_routes() -> Router {
    Router::new()
        .route("/api/orders", post(create_order))
        .route("/api/orders/user/{userId}", get(ok_json))
        .route("/api/orders/{id}", get(ok_json))
        .route("/api/products/capsules", get(ok_json))
        .route("/api/products/capsules/{id}", get(ok_json))
        .route("/api/products/machines", get(ok_json))
        .route("/api/products/machines/{id}", get(ok_json))
        .route("/api/cart/add", post(add_to_cart))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/slow", get(slow))
        .route("/api/boom", get(boom))
        .route("/api/broken", get(broken))
}

async fn ok_json() -> Json<Value> {
    Json(json!({"success": true, "data": []}))
}

/// `authorization: Bearer <id>` marks the caller as a registered user.
fn caller(headers: &HeaderMap) -> Option<AuthenticatedUser> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|id| AuthenticatedUser { id: id.to_string() })
}

async fn create_order(headers: HeaderMap, Json(_order): Json<Value>) -> Response {
    let created = (StatusCode::CREATED, Json(json!({"success": true})));
    match caller(&headers) {
        Some(user) => (Extension(user), created).into_response(),
        None => created.into_response(),
    }
}

async fn add_to_cart(Json(_item): Json<Value>) -> Json<Value> {
    Json(json!({"success": true}))
}

async fn register() -> impl IntoResponse {
    (StatusCode::CREATED, Json(json!({"success": true})))
}

async fn login(Json(credentials): Json<Value>) -> Response {
    if credentials["password"] == "secret" {
        let user = AuthenticatedUser {
            id: "u-42".to_string(),
        };
        (Extension(user), Json(json!({"token": "t"}))).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"success": false}))).into_response()
    }
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(60)).await;
    Json(json!({"success": true}))
}

async fn boom() -> Json<Value> {
    panic!("inventory service exploded")
}

async fn broken() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

/// Default config with log files under `dir` and console output off.
pub fn test_config(dir: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.logging.directory = dir.to_path_buf();
    config.logging.console = false;
    config
}

/// Layered router over the collaborator stubs, with its own registry.
pub fn app(config: AppConfig) -> (Router, Arc<MetricsRegistry>) {
    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let server = HttpServer::with_routes(config, metrics.clone(), collaborator_routes());
    (server.router(), metrics)
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Send one request and read the whole response, which completes the exchange.
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body)
}
