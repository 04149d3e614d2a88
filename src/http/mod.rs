//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers, built-in endpoints)
//!     → request.rs (request ID assigned and echoed)
//!     → pipeline (observation around every exchange)
//!     → collaborator routes or the 404 fallback
//!     → response.rs (JSON error envelope)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
