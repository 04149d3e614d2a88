//! Facts about one HTTP exchange, gathered by the pipeline.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, MatchedPath, Request};
use axum::http::{header, HeaderMap, Method};
use serde_json::{Map, Value};

use crate::http::request::X_REQUEST_ID;

/// Route label for requests no route matched.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Identity placed in request or response extensions by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
}

/// Whether the exchange was made by a known user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserType {
    Registered,
    Guest,
}

impl UserType {
    pub fn as_str(self) -> &'static str {
        match self {
            UserType::Registered => "registered",
            UserType::Guest => "guest",
        }
    }
}

/// Created when a request enters the pipeline and completed when the
/// response status is known. Only the pipeline mutates it.
#[derive(Debug, Clone)]
pub struct HttpExchangeContext {
    pub method: Method,
    pub raw_path: String,
    /// Path and query as received.
    pub url: String,
    pub route_template: Option<String>,
    /// `None` until the inner service has answered.
    pub status_code: Option<u16>,
    pub started_at: Instant,
    pub request_bytes: Option<u64>,
    pub response_bytes: u64,
    pub user: Option<AuthenticatedUser>,
    pub request_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip: String,
}

impl HttpExchangeContext {
    pub fn new(method: Method, url: &str) -> Self {
        let raw_path = url.split('?').next().unwrap_or_default().to_string();
        Self {
            method,
            raw_path,
            url: url.to_string(),
            route_template: None,
            status_code: None,
            started_at: Instant::now(),
            request_bytes: None,
            response_bytes: 0,
            user: None,
            request_id: None,
            user_agent: None,
            ip: "unknown".to_string(),
        }
    }

    pub fn from_request(request: &Request) -> Self {
        let uri = request.uri();
        let url = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| uri.path());

        let mut context = Self::new(request.method().clone(), url);
        let headers = request.headers();
        let extensions = request.extensions();

        context.route_template = extensions
            .get::<MatchedPath>()
            .map(|matched| matched.as_str().to_string());
        context.user = extensions.get::<AuthenticatedUser>().cloned();
        context.request_bytes = header_str(headers, header::CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse().ok());
        context.request_id = header_str(headers, X_REQUEST_ID).map(str::to_owned);
        context.user_agent = header_str(headers, header::USER_AGENT.as_str()).map(str::to_owned);
        context.ip = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .or_else(|| {
                header_str(headers, "x-forwarded-for")
                    .and_then(|v| v.split(',').next())
                    .map(|v| v.trim().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        context
    }

    /// Route template for metric labels; unmatched requests share one label.
    pub fn route_label(&self) -> &str {
        self.route_template.as_deref().unwrap_or(UNMATCHED_ROUTE)
    }

    pub fn user_type(&self) -> UserType {
        if self.user.is_some() {
            UserType::Registered
        } else {
            UserType::Guest
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.id.as_str())
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64() * 1000.0
    }

    /// Path parameters obtained by aligning the route template with the raw path.
    pub fn path_params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        let Some(template) = self.route_template.as_deref() else {
            return params;
        };

        let mut actual = self.raw_path.trim_matches('/').split('/');
        for segment in template.trim_matches('/').split('/') {
            if let Some(name) = segment.strip_prefix("{*").and_then(|s| s.strip_suffix('}')) {
                let rest: Vec<_> = actual.by_ref().collect();
                params.insert(name.to_string(), rest.join("/"));
                break;
            }
            let Some(value) = actual.next() else { break };
            if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                params.insert(name.to_string(), value.to_string());
            }
        }
        params
    }

    /// Decoded query string; a repeated key keeps its last value.
    pub fn query(&self) -> Map<String, Value> {
        let Some((_, query)) = self.url.split_once('?') else {
            return Map::new();
        };
        url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
