//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the core endpoints and the external handler set
//! - Wire up middleware (tracing, request ID, instrumentation, panic recovery)
//! - Serve on a bound listener until the shutdown coordinator fires

use std::panic::{self, AssertUnwindSafe};

use axum::{
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ObservabilityConfig;
use crate::database::Database;
use crate::http::middleware::recovery::panic_message;
use crate::http::middleware::{recover_panic, track_requests};
use crate::observability::metrics::EXPOSITION_CONTENT_TYPE;
use crate::observability::{CounterHandle, MetricsRegistry};

/// Path of the liveness endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Application state injected into handlers.
///
/// The external handler set receives the same state, so future query paths
/// borrow connections from `database` without owning the pool.
#[derive(Clone)]
pub struct AppState {
    pub metrics: MetricsRegistry,
    pub database: Database,
}

/// The route table could not be built.
///
/// Raised when the external handler set registers a core path, or a
/// configured path is not a valid route.
#[derive(Debug, thiserror::Error)]
#[error("invalid route table: {0}")]
pub struct RouteError(pub String);

/// HTTP server for the service.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Compose the core routes with `handlers` and wrap everything in middleware.
    pub fn new(
        config: &ObservabilityConfig,
        state: AppState,
        requests: CounterHandle,
        handlers: Router<AppState>,
    ) -> Result<Self, RouteError> {
        // The router reports overlapping or malformed routes only by panicking.
        let built = panic::catch_unwind(AssertUnwindSafe(|| {
            Self::build_router(config, state, requests, handlers)
        }));
        match built {
            Ok(router) => Ok(Self { router }),
            Err(panic) => Err(RouteError(panic_message(&*panic).to_string())),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(
        config: &ObservabilityConfig,
        state: AppState,
        requests: CounterHandle,
        handlers: Router<AppState>,
    ) -> Router {
        Router::new()
            .route(&config.metrics_path, get(scrape_handler))
            .route(HEALTH_PATH, get(health_handler))
            .merge(handlers)
            .fallback(not_found_handler)
            .layer(CatchPanicLayer::custom(recover_panic))
            .layer(middleware::from_fn_with_state(requests, track_requests))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .with_state(state)
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve connections until `shutdown` fires, then wait for open connections to finish.
    ///
    /// The caller bounds the wait; this future does not time out on its own.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server no longer accepting connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Prometheus scrape endpoint.
async fn scrape_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        state.metrics.render(),
    )
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "pool": state.database.stats(),
    }))
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}
