//! Cosmic Coffeehouse API server.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                 COFFEEHOUSE API                  │
//!                     │                                                  │
//!   Client Request    │  ┌────────────┐   ┌──────────┐   ┌────────────┐  │
//!   ──────────────────┼─▶│ request id │──▶│ pipeline │──▶│  handlers  │  │
//!                     │  └────────────┘   │ (observe)│   │ + timeout  │  │
//!                     │                   └────┬─────┘   └─────┬──────┘  │
//!   Client Response   │                        │               │         │
//!   ◀─────────────────┼────── CountingBody ◀───┴───────────────┘         │
//!                     │            │                                     │
//!                     │            ▼                                     │
//!                     │  ┌──────────────────┐   ┌──────────────────────┐ │
//!                     │  │ logging          │   │ metrics registry     │ │
//!                     │  │ console + files  │   │ GET /metrics         │ │
//!                     │  └──────────────────┘   └──────────────────────┘ │
//!                     └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use cosmic_coffeehouse::http::HttpServer;
use cosmic_coffeehouse::lifecycle::{self, signals, Shutdown};
use cosmic_coffeehouse::observability::logging::{Extra, Logger};

#[derive(Parser)]
#[command(name = "cosmic-coffeehouse")]
#[command(about = "The Cosmic Coffeehouse API server", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let startup = lifecycle::start(cli.config.as_deref()).await?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(signals::shutdown_on_signal(shutdown));

    let server = HttpServer::new(startup.config, startup.metrics);
    server.run(startup.listener, server_shutdown).await?;

    Logger::info("Shutdown complete", &Extra::new());
    drop(startup.logging);
    Ok(())
}
