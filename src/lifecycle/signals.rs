//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT (Ctrl+C) or SIGTERM
//! - Translate the first one into a shutdown broadcast
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A handler that cannot be installed is logged and never fires

use crate::lifecycle::shutdown::{Shutdown, ShutdownReason};
use crate::observability::logging::{Extra, Logger};

fn handler_failed(signal: &str, error: std::io::Error) {
    let mut extra = Extra::new();
    extra.insert("signal".into(), signal.into());
    extra.insert("error".into(), error.to_string().into());
    Logger::warn("Failed to install signal handler", &extra);
}

/// Resolve with the name of the first termination signal received.
pub async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            handler_failed("SIGINT", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                handler_failed("SIGTERM", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

/// Trigger `shutdown` on the first termination signal.
pub async fn shutdown_on_signal(shutdown: Shutdown) {
    let signal = wait_for_signal().await;

    let mut extra = Extra::new();
    extra.insert("signal".into(), signal.into());
    Logger::info("Termination signal received", &extra);

    shutdown.trigger(ShutdownReason::Signal(signal));
}
