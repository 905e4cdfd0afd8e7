//! Startup sequencing and bounded shutdown.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order, aborting on the first failure
//! - Start the listener on its own task, then park on the termination future
//! - Drain in-flight requests up to the deadline, then close the pool within
//!   whatever is left of it
//! - Flush the logger last, on every exit path
//!
//! # States
//! ```text
//! Uninitialized → LoggerReady → MetricsReady → PoolReady → Serving → Draining → Stopped
//!        any *Ready failure or termination before Serving ───────────────────↗
//! ```

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::{Duration, Instant};

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

use crate::config::{AppConfig, ConfigError};
use crate::database::{Database, DatabaseError};
use crate::http::{AppState, HttpServer, RouteError};
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::{
    CounterHandle, Logger, LoggerError, MetricsError, MetricsRegistry, HTTP_REQUESTS_TOTAL,
};

/// Lifecycle phase, published as it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    LoggerReady,
    MetricsReady,
    PoolReady,
    Serving { addr: SocketAddr },
    Draining,
    Stopped,
}

/// Fatal lifecycle failures. Every variant exits the process nonzero.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("logger init error: {0}")]
    Logger(#[from] LoggerError),
    #[error("metrics init error: {0}")]
    Metrics(#[from] MetricsError),
    #[error("database init error: {0}")]
    Database(#[from] DatabaseError),
    #[error("{0}")]
    Routes(#[from] RouteError),
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] io::Error),
    #[error("server task failed: {0}")]
    ServeTask(#[from] JoinError),
}

impl LifecycleError {
    pub fn exit_code(&self) -> u8 {
        1
    }
}

/// How the serving phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// The listener had started before termination was requested.
    pub served: bool,
    /// The drain deadline passed with requests still in flight.
    pub forced: bool,
    /// Time spent between the termination signal and the end of draining.
    pub drain_elapsed: Duration,
}

impl ShutdownReport {
    fn before_serving() -> Self {
        Self {
            served: false,
            forced: false,
            drain_elapsed: Duration::ZERO,
        }
    }
}

/// Drives the service from startup to exit.
pub struct Orchestrator {
    config: AppConfig,
    handlers: Router<AppState>,
    phase: watch::Sender<Phase>,
}

impl Orchestrator {
    /// `handlers` is the external request handler set merged under the core routes.
    pub fn new(config: AppConfig, handlers: Router<AppState>) -> Self {
        let (phase, _) = watch::channel(Phase::Uninitialized);
        Self {
            config,
            handlers,
            phase,
        }
    }

    /// Observe phase transitions.
    pub fn phases(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Run until `shutdown` resolves or a fatal error occurs.
    ///
    /// `shutdown` is polled from the start, so termination during startup
    /// abandons the remaining steps and exits cleanly. The logger is flushed
    /// before this returns, whatever the outcome.
    pub async fn run<F>(self, logger: Logger, shutdown: F) -> Result<ShutdownReport, LifecycleError>
    where
        F: Future<Output = ()>,
    {
        self.advance(Phase::LoggerReady);

        tokio::pin!(shutdown);
        let outcome = self.start_and_serve(shutdown).await;
        match &outcome {
            Ok(report) => tracing::info!(
                forced = report.forced,
                drain_ms = report.drain_elapsed.as_millis() as u64,
                "Shutdown complete"
            ),
            Err(e) => tracing::error!(error = %e, "Fatal error, exiting"),
        }

        self.advance(Phase::Stopped);
        logger.flush();
        outcome
    }

    async fn start_and_serve<F>(
        &self,
        mut shutdown: Pin<&mut F>,
    ) -> Result<ShutdownReport, LifecycleError>
    where
        F: Future<Output = ()>,
    {
        let (metrics, requests, database) = tokio::select! {
            ready = self.start() => ready?,
            _ = shutdown.as_mut() => {
                tracing::info!("Termination requested during startup, not serving");
                return Ok(ShutdownReport::before_serving());
            }
        };

        let outcome = self.serve(metrics, requests, database.clone(), shutdown).await;

        // The pool gets whatever is left of the drain deadline.
        let deadline = self.config.shutdown.drain_timeout();
        let remaining = match &outcome {
            Ok(report) => deadline.saturating_sub(report.drain_elapsed),
            Err(_) => deadline,
        };
        database.close(remaining).await;
        outcome
    }

    async fn start(&self) -> Result<(MetricsRegistry, CounterHandle, Database), LifecycleError> {
        let metrics = MetricsRegistry::new();
        let requests = metrics.register(HTTP_REQUESTS_TOTAL)?;
        self.advance(Phase::MetricsReady);

        let database = Database::connect(&self.config.database).await?;
        self.advance(Phase::PoolReady);

        Ok((metrics, requests, database))
    }

    async fn serve<F>(
        &self,
        metrics: MetricsRegistry,
        requests: CounterHandle,
        database: Database,
        mut shutdown: Pin<&mut F>,
    ) -> Result<ShutdownReport, LifecycleError>
    where
        F: Future<Output = ()>,
    {
        let state = AppState { metrics, database };
        let server = HttpServer::new(
            &self.config.observability,
            state,
            requests,
            self.handlers.clone(),
        )?;

        let address = self.config.listener.bind_address.clone();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| LifecycleError::Bind { address, source })?;
        let addr = listener.local_addr().map_err(LifecycleError::Serve)?;

        let coordinator = Shutdown::new();
        let mut server_task: JoinHandle<io::Result<()>> =
            tokio::spawn(server.run(listener, coordinator.subscribe()));
        self.advance(Phase::Serving { addr });

        tokio::select! {
            _ = shutdown.as_mut() => {
                tracing::info!("Shutdown Server ...");
            }
            result = &mut server_task => {
                return Err(match result {
                    Ok(Ok(())) => LifecycleError::Serve(io::Error::other(
                        "listener stopped before shutdown was requested",
                    )),
                    Ok(Err(e)) => LifecycleError::Serve(e),
                    Err(e) => LifecycleError::ServeTask(e),
                });
            }
        }

        self.advance(Phase::Draining);
        coordinator.trigger();

        let deadline = self.config.shutdown.drain_timeout();
        let started = Instant::now();
        let forced = match tokio::time::timeout(deadline, &mut server_task).await {
            Ok(Ok(Ok(()))) => {
                tracing::info!("Server exited gracefully");
                false
            }
            Ok(Ok(Err(e))) => {
                tracing::error!(error = %e, "Server failed while draining");
                false
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Server task failed while draining");
                false
            }
            Err(_) => {
                server_task.abort();
                tracing::warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    "Server forced to shutdown, drain deadline exceeded"
                );
                true
            }
        };

        Ok(ShutdownReport {
            served: true,
            forced,
            drain_elapsed: started.elapsed(),
        })
    }

    fn advance(&self, next: Phase) {
        tracing::info!(phase = ?next, "Lifecycle phase");
        self.phase.send_replace(next);
    }
}
