//! Request observation pipeline.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → context.rs (method, path, route template, sizes, identity)
//!     → middleware.rs entry stages
//!         access log:  `http` arrival record
//!         security:    security.rs detectors over body + query + params + URL,
//!                      `auth` record for /auth/ paths
//!     → inner service (handlers, timeout, panic guard)
//!     → body.rs (CountingBody wraps the response body)
//!     → on body end or drop, exactly once:
//!         classifier.rs (business event, shared by the stages below)
//!         metrics:     HTTP series, business counter, error counter
//!         access log:  `api` record, slow request, failed request
//!         business:    `business` record
//! ```
//!
//! # Design Decisions
//! - Stages are toggled by `PipelineConfig` and never alter the response
//! - A panicking stage is logged and contained
//! - Bodies are only buffered for inspection when their size is known and bounded

pub mod body;
pub mod classifier;
pub mod context;
pub mod middleware;
pub mod security;

pub use body::CountingBody;
pub use classifier::{classify, AuthStatus, BusinessEvent, ProductType};
pub use context::{AuthenticatedUser, HttpExchangeContext, UserType};
pub use middleware::{observe, run_stage, Pipeline};
pub use security::{SecurityInspector, SuspiciousPattern};
