//! In-process tests of the observation pipeline around the full router.

use axum::http::StatusCode;
use serde_json::{json, Value};

use cosmic_coffeehouse::observability::logging::LogLevel;

mod common;
use common::{app, capture_logs, empty_request, json_request, sample, send, test_config};

#[tokio::test]
async fn test_guest_order_counted_and_logged() {
    let dir = tempfile::tempdir().unwrap();
    let (router, metrics) = app(test_config(dir.path()));
    let (logs, _guard) = capture_logs(LogLevel::Debug);

    let body = json!({"items": [{"type": "capsule", "quantity": 2}]});
    let (status, _, _) = send(&router, json_request("POST", "/api/orders", &body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let text = metrics.snapshot();
    assert_eq!(
        sample(
            &text,
            "cosmic_coffeehouse_orders_total",
            &[("product_type", "capsule"), ("user_type", "guest")]
        ),
        Some(1.0)
    );
    assert_eq!(
        sample(
            &text,
            "http_requests_total",
            &[("method", "POST"), ("route", "/api/orders"), ("status_code", "201")]
        ),
        Some(1.0)
    );

    let business = logs.with_category("business");
    assert_eq!(business.len(), 1);
    assert_eq!(business[0]["event"], "Order created");
    assert_eq!(business[0]["user_type"], "guest");
    assert!(business[0].get("user_id").is_none());
}

#[tokio::test]
async fn test_registered_order_uses_response_identity() {
    let dir = tempfile::tempdir().unwrap();
    let (router, metrics) = app(test_config(dir.path()));
    let (logs, _guard) = capture_logs(LogLevel::Info);

    let mut request = json_request("POST", "/api/orders", &json!({"items": [{"type": "machine"}]}));
    request
        .headers_mut()
        .insert("authorization", "Bearer u-7".parse().unwrap());
    send(&router, request).await;

    assert_eq!(
        sample(
            &metrics.snapshot(),
            "cosmic_coffeehouse_orders_total",
            &[("product_type", "machine"), ("user_type", "registered")]
        ),
        Some(1.0)
    );
    assert_eq!(logs.with_category("business")[0]["user_id"], "u-7");
}

#[tokio::test]
async fn test_product_view_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let (router, metrics) = app(test_config(dir.path()));

    let (status, _, _) = send(&router, empty_request("GET", "/api/products/capsules/abc123")).await;
    assert_eq!(status, StatusCode::OK);
    send(&router, empty_request("GET", "/api/products/machines")).await;

    let text = metrics.snapshot();
    assert_eq!(
        sample(
            &text,
            "cosmic_coffeehouse_product_views_total",
            &[("product_type", "capsule"), ("product_id", "abc123")]
        ),
        Some(1.0)
    );
    assert_eq!(
        sample(
            &text,
            "cosmic_coffeehouse_product_views_total",
            &[("product_type", "machine"), ("product_id", "list")]
        ),
        Some(1.0)
    );
    // Route label is the template, not the raw path.
    assert_eq!(
        sample(
            &text,
            "http_requests_total",
            &[("route", "/api/products/capsules/{id}"), ("status_code", "200")]
        ),
        Some(1.0)
    );
}

#[tokio::test]
async fn test_error_counters_by_status_class() {
    let dir = tempfile::tempdir().unwrap();
    let (router, metrics) = app(test_config(dir.path()));
    let (logs, _guard) = capture_logs(LogLevel::Info);

    send(&router, empty_request("GET", "/api/products/capsules")).await;
    let (status, _, body) = send(&router, empty_request("GET", "/api/nowhere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"]["code"], "RESOURCE_NOT_FOUND");
    assert_eq!(body["error"]["message"], "Cannot GET /api/nowhere");

    let (status, _, _) = send(&router, empty_request("GET", "/api/broken")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let text = metrics.snapshot();
    assert_eq!(
        sample(
            &text,
            "cosmic_coffeehouse_errors_total",
            &[("error_type", "client_error"), ("severity", "medium")]
        ),
        Some(1.0)
    );
    assert_eq!(
        sample(
            &text,
            "cosmic_coffeehouse_errors_total",
            &[("error_type", "server_error"), ("severity", "high")]
        ),
        Some(1.0)
    );
    assert_eq!(
        sample(&text, "http_requests_total", &[("route", "unmatched"), ("status_code", "404")]),
        Some(1.0)
    );

    assert_eq!(logs.with_message("Request failed with status 404").len(), 1);
    assert_eq!(logs.with_message("Request failed with status 503").len(), 1);
    assert!(logs.with_message("Request failed with status 200").is_empty());
}

#[tokio::test]
async fn test_handler_panic_observed_as_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let (router, metrics) = app(test_config(dir.path()));
    let (logs, _guard) = capture_logs(LogLevel::Info);

    let (status, _, body) = send(&router, empty_request("GET", "/api/boom")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"]["code"], "INTERNAL_SERVER_ERROR");

    let unhandled = logs.with_message("Unhandled application error");
    assert_eq!(unhandled.len(), 1);
    assert!(unhandled[0]["extra"].as_str().unwrap().contains("inventory service exploded"));

    assert_eq!(
        sample(
            &metrics.snapshot(),
            "http_requests_total",
            &[("route", "/api/boom"), ("status_code", "500")]
        ),
        Some(1.0)
    );
}

#[tokio::test]
async fn test_duration_matches_wall_clock() {
    let dir = tempfile::tempdir().unwrap();
    let (router, metrics) = app(test_config(dir.path()));

    send(&router, empty_request("GET", "/api/slow")).await;

    let text = metrics.snapshot();
    let labels = [("route", "/api/slow"), ("status_code", "200")];
    assert_eq!(
        sample(&text, "http_request_duration_seconds_count", &labels),
        Some(1.0)
    );
    let seconds = sample(&text, "http_request_duration_seconds_sum", &labels).unwrap();
    assert!(seconds >= 0.06, "observed {}", seconds);
    assert!(seconds < 5.0, "observed {}", seconds);
    assert_eq!(
        sample(&text, "http_request_duration_seconds_bucket", &[("route", "/api/slow"), ("le", "0.05")]),
        Some(0.0)
    );
}

#[tokio::test]
async fn test_slow_request_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.pipeline.slow_request_ms = 20;
    let (router, _) = app(config);
    let (logs, _guard) = capture_logs(LogLevel::Info);

    send(&router, empty_request("GET", "/api/slow")).await;
    send(&router, empty_request("GET", "/health")).await;

    let perf = logs.with_category("performance");
    assert_eq!(perf.len(), 1);
    assert_eq!(perf[0]["metric"], "slow_request");
    assert_eq!(perf[0]["path"], "/api/slow");
    assert_eq!(perf[0]["unit"], "ms");
}

#[tokio::test]
async fn test_directory_traversal_logged_once() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(test_config(dir.path()));
    let (logs, _guard) = capture_logs(LogLevel::Debug);

    let hostile = json!({"type": "capsule", "note": "../../etc/passwd"});
    let innocuous = json!({"type": "capsule", "note": "ab/cd/etc/passwd"});
    assert_eq!(hostile.to_string().len(), innocuous.to_string().len());

    send(&router, json_request("POST", "/api/cart/add", &hostile)).await;
    let security = logs.with_category("security");
    assert_eq!(security.len(), 1);
    assert_eq!(security[0]["severity"], "medium");
    assert_eq!(security[0]["log_level"], "warn");
    assert_eq!(security[0]["pattern"], "directory_traversal");
    assert_eq!(security[0]["message"], "SECURITY [MEDIUM]: Suspicious request pattern detected");

    send(&router, json_request("POST", "/api/cart/add", &innocuous)).await;
    assert_eq!(logs.with_category("security").len(), 1);
}

#[tokio::test]
async fn test_query_and_url_inspected() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(test_config(dir.path()));
    let (logs, _guard) = capture_logs(LogLevel::Info);

    send(&router, empty_request("GET", "/api/products/capsules?q=%3Cscript%3Ealert(1)")).await;

    let security = logs.with_category("security");
    assert_eq!(security.len(), 1);
    assert_eq!(security[0]["pattern"], "script_injection");
}

#[tokio::test]
async fn test_login_attempts_and_auth_audit() {
    let dir = tempfile::tempdir().unwrap();
    let (router, metrics) = app(test_config(dir.path()));
    let (logs, _guard) = capture_logs(LogLevel::Info);

    let (status, _, _) = send(
        &router,
        json_request("POST", "/api/auth/login", &json!({"email": "a@b.c", "password": "secret"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(
        &router,
        json_request("POST", "/api/auth/login", &json!({"email": "a@b.c", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    send(&router, json_request("POST", "/api/auth/register", &json!({"email": "n@b.c"}))).await;

    let text = metrics.snapshot();
    for status in ["success", "failure"] {
        assert_eq!(
            sample(
                &text,
                "cosmic_coffeehouse_auth_attempts_total",
                &[("method", "login"), ("status", status)]
            ),
            Some(1.0)
        );
    }
    assert_eq!(
        sample(&text, "cosmic_coffeehouse_user_registrations_total", &[]),
        Some(1.0)
    );

    let audit = logs.with_category("authentication");
    assert_eq!(audit.len(), 3);
    assert_eq!(audit[0]["message"], "AUTH: Authentication attempt on /api/auth/login");

    // Successful login carries the identity set by the handler.
    let business = logs.with_message("BUSINESS: Authentication attempt");
    assert_eq!(business.len(), 2);
    assert_eq!(business[0]["user_id"], "u-42");
}

#[tokio::test]
async fn test_cart_addition_identified_by_session() {
    let dir = tempfile::tempdir().unwrap();
    let (router, metrics) = app(test_config(dir.path()));
    let (logs, _guard) = capture_logs(LogLevel::Info);

    let item = json!({"productId": "c-1", "type": "capsule", "sessionId": "s-99"});
    send(&router, json_request("POST", "/api/cart/add", &item)).await;

    assert_eq!(
        sample(
            &metrics.snapshot(),
            "cosmic_coffeehouse_cart_additions_total",
            &[("product_type", "capsule"), ("user_type", "guest")]
        ),
        Some(1.0)
    );
    let business = logs.with_category("business");
    assert_eq!(business[0]["event"], "Item added to cart");
    assert_eq!(business[0]["user_id"], "s-99");
}

#[tokio::test]
async fn test_access_records_and_request_id() {
    let dir = tempfile::tempdir().unwrap();
    let (router, metrics) = app(test_config(dir.path()));
    let (logs, _guard) = capture_logs(LogLevel::Http);

    let order = json!({"items": [{"type": "capsule"}]});
    let (_, headers, body) = send(&router, json_request("POST", "/api/orders", &order)).await;

    let request_id = headers.get("x-request-id").unwrap().to_str().unwrap();
    assert!(!request_id.is_empty());

    let access: Vec<_> = logs
        .records()
        .into_iter()
        .filter(|r| r["log_level"] == "http")
        .collect();
    assert_eq!(access.len(), 2);
    assert_eq!(access[0]["message"], "POST /api/orders");
    assert_eq!(access[1]["category"], "api");
    assert_eq!(access[1]["status_code"], 201);
    assert_eq!(access[1]["request_id"], request_id);
    assert_eq!(access[1]["content_length"], body.len() as u64);

    let text = metrics.snapshot();
    assert_eq!(
        sample(&text, "http_request_size_bytes_count", &[("route", "/api/orders")]),
        Some(1.0)
    );
    assert_eq!(
        sample(&text, "http_response_size_bytes_sum", &[("route", "/api/orders")]),
        Some(body.len() as f64)
    );
}

#[tokio::test]
async fn test_info_threshold_hides_access_records() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(test_config(dir.path()));
    let (logs, _guard) = capture_logs(LogLevel::Info);

    send(&router, empty_request("GET", "/api/products/machines")).await;

    assert!(logs.records().iter().all(|r| r["log_level"] != "http"));
    assert_eq!(logs.with_category("business").len(), 1);
}

#[tokio::test]
async fn test_disabled_stages_stay_silent() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.pipeline.metrics = false;
    config.pipeline.business = false;
    config.pipeline.security = false;
    let (router, metrics) = app(config);
    let (logs, _guard) = capture_logs(LogLevel::Debug);

    let hostile = json!({"items": [{"type": "capsule"}], "note": "../x"});
    let (status, _, _) = send(&router, json_request("POST", "/api/orders", &hostile)).await;
    assert_eq!(status, StatusCode::CREATED);

    assert_eq!(sample(&metrics.snapshot(), "http_requests_total", &[]), None);
    assert!(logs.with_category("business").is_empty());
    assert!(logs.with_category("security").is_empty());
    assert_eq!(logs.with_category("api").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_observed_as_408() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.timeouts.request_secs = 1;
    let metrics = std::sync::Arc::new(cosmic_coffeehouse::MetricsRegistry::new().unwrap());
    let stalled = axum::Router::new().route(
        "/api/stalled",
        axum::routing::get(|| async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            "never"
        }),
    );
    let router = cosmic_coffeehouse::HttpServer::with_routes(config, metrics.clone(), stalled).router();

    let (status, _, _) = send(&router, empty_request("GET", "/api/stalled")).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(
        sample(
            &metrics.snapshot(),
            "http_requests_total",
            &[("route", "/api/stalled"), ("status_code", "408")]
        ),
        Some(1.0)
    );
}
