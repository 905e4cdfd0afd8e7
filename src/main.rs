//! HTTP service bootstrap.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                 ORCHESTRATOR                  │
//!                    │                                               │
//!    config + env ──▶│  logger ─▶ metrics ─▶ pool ─▶ listener (task) │
//!                    │                                    │          │
//!                    │          SIGINT/SIGTERM ─▶ drain (deadline)   │
//!                    │                                    │          │
//!                    │                 close pool ─▶ flush logs      │
//!                    └──────────────────────────────────────────────┘
//!
//!    Client ─▶ trace ─▶ request id ─▶ instrument ─▶ recover ─▶ handler set
//!                                         │
//!                                         └─▶ http_requests_total ─▶ /metrics
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use axum::Router;
use clap::Parser;

use service_core::config::{load_config, ObservabilityConfig};
use service_core::lifecycle::{LifecycleError, Termination};
use service_core::{AppState, Logger, Orchestrator};

#[derive(Parser, Debug)]
#[command(name = "service-core", version, about = "HTTP service bootstrap and observability core")]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = load_config(cli.config.as_deref());
    let log_filter = match &loaded {
        Ok(config) => config.observability.log_filter.clone(),
        Err(_) => ObservabilityConfig::default().log_filter,
    };

    let logger = match Logger::install(&log_filter) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("{}", LifecycleError::from(e));
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(app = "main", "logger init success");

    // Registered before anything slow, so an early SIGTERM still flushes the logs.
    let mut termination = match Termination::install() {
        Ok(termination) => termination,
        Err(e) => {
            let e = LifecycleError::Signals(e);
            tracing::error!(error = %e, "Startup aborted");
            logger.flush();
            return ExitCode::from(e.exit_code());
        }
    };

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            let e = LifecycleError::from(e);
            tracing::error!(error = %e, "Startup aborted");
            logger.flush();
            return ExitCode::from(e.exit_code());
        }
    };

    tracing::info!(
        bind_address = %config.listener.bind_address,
        drain_timeout_ms = config.shutdown.drain_timeout_ms,
        metrics_path = %config.observability.metrics_path,
        "Configuration loaded"
    );

    // Domain endpoints are registered by the embedding service.
    let handlers: Router<AppState> = Router::new();

    let orchestrator = Orchestrator::new(config, handlers);
    let shutdown = async move {
        let signal = termination.recv().await;
        tracing::info!(%signal, "Termination signal received");
    };

    match orchestrator.run(logger, shutdown).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => ExitCode::from(e.exit_code()),
    }
}
