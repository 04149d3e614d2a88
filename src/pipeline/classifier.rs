//! Business event classification.
//!
//! Maps generic exchange facts (method, path, status, request body) onto the
//! shop's business events. Rules are evaluated in order; the first match wins.

use axum::http::Method;
use serde_json::Value;

use crate::observability::metrics::MetricsRegistry;
use crate::pipeline::context::{HttpExchangeContext, UserType};

/// Product family tag used as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductType {
    Capsule,
    Machine,
    Unknown,
}

impl ProductType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductType::Capsule => "capsule",
            ProductType::Machine => "machine",
            ProductType::Unknown => "unknown",
        }
    }

    /// Accepts singular body tags and plural path segments.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "capsule" | "capsules" => ProductType::Capsule,
            "machine" | "machines" => ProductType::Machine,
            _ => ProductType::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthStatus {
    Success,
    Failure,
}

impl AuthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthStatus::Success => "success",
            AuthStatus::Failure => "failure",
        }
    }
}

/// Business meaning inferred from one exchange. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusinessEvent {
    OrderCreated {
        product_type: ProductType,
        user_type: UserType,
    },
    ProductViewed {
        product_type: ProductType,
        product_id: String,
    },
    CartItemAdded {
        product_type: ProductType,
        user_type: UserType,
    },
    UserRegistered,
    AuthAttempt {
        status: AuthStatus,
    },
}

impl BusinessEvent {
    /// Message of the `business` log record.
    pub fn message(&self) -> &'static str {
        match self {
            BusinessEvent::OrderCreated { .. } => "Order created",
            BusinessEvent::ProductViewed { .. } => "Product viewed",
            BusinessEvent::CartItemAdded { .. } => "Item added to cart",
            BusinessEvent::UserRegistered => "User registered",
            BusinessEvent::AuthAttempt { .. } => "Authentication attempt",
        }
    }

    pub fn product_type(&self) -> Option<ProductType> {
        match self {
            BusinessEvent::OrderCreated { product_type, .. }
            | BusinessEvent::ProductViewed { product_type, .. }
            | BusinessEvent::CartItemAdded { product_type, .. } => Some(*product_type),
            BusinessEvent::UserRegistered | BusinessEvent::AuthAttempt { .. } => None,
        }
    }

    /// Feed the domain counter matching this event.
    pub fn record(&self, metrics: &MetricsRegistry) {
        match self {
            BusinessEvent::OrderCreated {
                product_type,
                user_type,
            } => metrics.record_order(product_type.as_str(), user_type.as_str()),
            BusinessEvent::ProductViewed {
                product_type,
                product_id,
            } => metrics.record_product_view(product_type.as_str(), product_id),
            BusinessEvent::CartItemAdded {
                product_type,
                user_type,
            } => metrics.record_cart_addition(product_type.as_str(), user_type.as_str()),
            BusinessEvent::UserRegistered => metrics.record_user_registration(),
            BusinessEvent::AuthAttempt { status } => {
                metrics.record_authentication_attempt("login", status.as_str())
            }
        }
    }
}

struct Rule {
    name: &'static str,
    matches: fn(&Method, &str, u16) -> bool,
    build: fn(&HttpExchangeContext, Option<&Value>) -> BusinessEvent,
}

const PRODUCTS_PREFIX: &str = "/api/products/";

const RULES: &[Rule] = &[
    Rule {
        name: "order_created",
        matches: |method, path, status| {
            *method == Method::POST && path == "/api/orders" && status == 201
        },
        build: |exchange, body| BusinessEvent::OrderCreated {
            product_type: body_type(body.and_then(|b| b.pointer("/items/0/type"))),
            user_type: exchange.user_type(),
        },
    },
    Rule {
        name: "product_viewed",
        matches: |method, path, status| {
            *method == Method::GET && path.starts_with(PRODUCTS_PREFIX) && status == 200
        },
        build: |exchange, _| {
            let (product_type, product_id) = product_from_path(&exchange.raw_path);
            BusinessEvent::ProductViewed {
                product_type,
                product_id,
            }
        },
    },
    Rule {
        name: "cart_item_added",
        matches: |method, path, status| {
            *method == Method::POST && path == "/api/cart/add" && matches!(status, 200 | 201)
        },
        build: |exchange, body| BusinessEvent::CartItemAdded {
            product_type: body_type(body.and_then(|b| b.get("type"))),
            user_type: exchange.user_type(),
        },
    },
    Rule {
        name: "user_registered",
        matches: |method, path, status| {
            *method == Method::POST && path == "/api/auth/register" && status == 201
        },
        build: |_, _| BusinessEvent::UserRegistered,
    },
    Rule {
        name: "auth_attempt",
        matches: |method, path, _| *method == Method::POST && path == "/api/auth/login",
        build: |exchange, _| BusinessEvent::AuthAttempt {
            status: if exchange.status_code == Some(200) {
                AuthStatus::Success
            } else {
                AuthStatus::Failure
            },
        },
    },
];

fn normalize(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

fn body_type(value: Option<&Value>) -> ProductType {
    value
        .and_then(Value::as_str)
        .map(ProductType::from_tag)
        .unwrap_or(ProductType::Unknown)
}

/// `/api/products/capsules/<id>` → (capsule, `<id>`); no id → `"list"`.
fn product_from_path(path: &str) -> (ProductType, String) {
    let mut segments = normalize(path)
        .strip_prefix(PRODUCTS_PREFIX)
        .unwrap_or_default()
        .split('/')
        .filter(|s| !s.is_empty());

    while let Some(segment) = segments.next() {
        let product_type = ProductType::from_tag(segment);
        if product_type != ProductType::Unknown {
            let id = segments.next().unwrap_or("list").to_string();
            return (product_type, id);
        }
    }
    (ProductType::Unknown, "list".to_string())
}

/// Derive the business event of a completed exchange, if any.
///
/// Returns `None` while the status is unknown.
pub fn classify(exchange: &HttpExchangeContext, body_hint: Option<&Value>) -> Option<BusinessEvent> {
    let status = exchange.status_code?;
    let path = normalize(&exchange.raw_path);
    RULES
        .iter()
        .find(|rule| (rule.matches)(&exchange.method, path, status))
        .map(|rule| (rule.build)(exchange, body_hint))
}

/// Names of every rule matching the given facts, in priority order.
pub fn matching_rules(method: &Method, path: &str, status: u16) -> Vec<&'static str> {
    let path = normalize(path);
    RULES
        .iter()
        .filter(|rule| (rule.matches)(method, path, status))
        .map(|rule| rule.name)
        .collect()
}
