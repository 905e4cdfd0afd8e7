//! Request instrumentation middleware.
//! Counts every completed request by method, route template, and status.

use std::time::{Duration, Instant};

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};

use crate::observability::CounterHandle;

/// Requests slower than this are logged at warn level.
const SLOW_REQUEST: Duration = Duration::from_secs(1);

/// Route template of the matched handler, or an empty string when nothing matched.
pub fn route_label<B>(request: &axum::http::Request<B>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_default()
}

pub async fn track_requests(
    State(requests): State<CounterHandle>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = route_label(&request);

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    if let Err(e) = requests.increment(&[&method, &route, &status]) {
        tracing::error!(error = %e, "Failed to record request metric");
    }

    let elapsed = start.elapsed();
    if elapsed > SLOW_REQUEST {
        tracing::warn!(
            method = %method,
            route = %route,
            status = %status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Slow request detected"
        );
    }

    response
}
