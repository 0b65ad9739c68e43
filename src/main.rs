//! Service bootstrap binary.
//!
//! # Architecture Overview
//!
//! ```text
//!   config (file + env) ──▶ logging / metrics
//!          │
//!          ▼
//!   ┌────────────── App (composition root) ──────────────┐
//!   │  database ──▶ cache ──▶ router ──▶ listener         │
//!   │      hooks registered in this order                 │
//!   └─────────────────────────────────────────────────────┘
//!          │ run_starts (in order)      ▲ run_stops (reverse)
//!          ▼                            │
//!       serving ── SIGINT / SIGTERM ────┘
//! ```
//!
//! Exit codes: 0 clean shutdown, 1 startup or shutdown failure,
//! 2 invalid configuration.

use std::path::PathBuf;
use std::process::ExitCode;

use axum::Router;
use clap::Parser;

use service_bootstrap::config::load_config;
use service_bootstrap::observability::{logging, metrics};
use service_bootstrap::App;

#[derive(Debug, Parser)]
#[command(name = "service-bootstrap", version, about = "HTTP service with managed PostgreSQL and Redis resources")]
struct Cli {
    /// Path to a TOML config file; environment variables override it.
    #[arg(short, long, env = "APP_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = logging::init(&config.app.log_level, config.app.env) {
        eprintln!("failed to initialize logging: {}", e);
    }

    tracing::info!(
        service = %config.app.name,
        env = %config.app.env,
        version = env!("CARGO_PKG_VERSION"),
        "Starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let app = match App::build(config, Router::new()) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "Failed to wire application");
            return ExitCode::from(e.exit_code());
        }
    };

    match app.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting with failure");
            ExitCode::from(e.exit_code())
        }
    }
}
