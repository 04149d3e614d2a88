//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the service endpoints
//! - Merge collaborator routes (catalog, cart, orders, auth)
//! - Wire up middleware (request ID, observation pipeline, timeout, panic guard)
//! - Bind server to listener and stop on the shutdown broadcast

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer};

use crate::config::AppConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::response::{error_response, not_found};
use crate::lifecycle::shutdown::ShutdownReason;
use crate::observability::logging::{Extra, Logger};
use crate::observability::metrics::MetricsRegistry;
use crate::pipeline::middleware::panic_message;
use crate::pipeline::{observe, Pipeline};

/// Content type of the Prometheus text exposition.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricsRegistry>,
    pub started_at: Instant,
}

/// HTTP server for the coffeehouse API.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
}

impl HttpServer {
    /// Create a server exposing only the built-in endpoints.
    pub fn new(config: AppConfig, metrics: Arc<MetricsRegistry>) -> Self {
        Self::with_routes(config, metrics, Router::new())
    }

    /// Create a server with collaborator routes merged in.
    pub fn with_routes(config: AppConfig, metrics: Arc<MetricsRegistry>, api: Router) -> Self {
        let state = AppState {
            metrics: metrics.clone(),
            started_at: Instant::now(),
        };
        let pipeline = Arc::new(Pipeline::new(config.pipeline.clone(), metrics));
        let router = Self::build_router(&config, state, pipeline, api);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers run outermost first: request ID, observation, timeout, panic guard.
    #[allow(deprecated)]
    fn build_router(config: &AppConfig, state: AppState, pipeline: Arc<Pipeline>, api: Router) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/api", get(api_info_handler))
            .with_state(state)
            .merge(api)
            .fallback(not_found_handler)
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::from_fn_with_state(pipeline, observe))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until the shutdown broadcast fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<ShutdownReason>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let mut extra = Extra::new();
        extra.insert("address".into(), addr.to_string().into());
        extra.insert("level".into(), self.config.logging.level.as_str().into());
        Logger::info("Cosmic Coffeehouse API server started", &extra);

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut extra = Extra::new();
                if let Ok(reason) = shutdown.recv().await {
                    extra.insert("reason".into(), reason.to_string().into());
                }
                Logger::info("Shutdown signal received", &extra);
            })
            .await?;

        Logger::info("HTTP server stopped", &Extra::new());
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "online",
        "message": "The Cosmic Coffeehouse API is operational",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
        state.metrics.snapshot(),
    )
        .into_response()
}

async fn api_info_handler() -> Json<Value> {
    Json(json!({
        "name": "The Cosmic Coffeehouse API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Superpower Coffee E-commerce Platform",
        "endpoints": {
            "health": "/health",
            "metrics": "/metrics",
            "auth": "/api/auth",
            "products": "/api/products",
            "cart": "/api/cart",
            "orders": "/api/orders",
        },
    }))
}

async fn not_found_handler(method: Method, uri: Uri) -> Response {
    let url = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    not_found(method.as_str(), url)
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let mut extra = Extra::new();
    extra.insert("error".into(), panic_message(panic.as_ref()).into());
    Logger::error("Unhandled application error", &extra);

    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_SERVER_ERROR",
        "Internal Server Error",
    )
}
