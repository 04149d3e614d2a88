//! JSON error responses.
//!
//! Every error the service produces itself (unknown route, unreadable body,
//! handler panic) has the same envelope:
//!
//! ```text
//! { "success": false, "error": { "code": ..., "message": ..., "suggestion"? } }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorDetail,
}

/// Build an error response with the standard envelope.
pub fn error_response(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    envelope(status, code, message.into(), None)
}

/// `404` for requests no route handles.
pub fn not_found(method: &str, url: &str) -> Response {
    envelope(
        StatusCode::NOT_FOUND,
        "RESOURCE_NOT_FOUND",
        format!("Cannot {} {}", method, url),
        Some("Check the API documentation at /api for available endpoints"),
    )
}

fn envelope(
    status: StatusCode,
    code: &'static str,
    message: String,
    suggestion: Option<&'static str>,
) -> Response {
    let body = ErrorEnvelope {
        success: false,
        error: ErrorDetail {
            code,
            message,
            suggestion,
        },
    };
    (status, Json(body)).into_response()
}
