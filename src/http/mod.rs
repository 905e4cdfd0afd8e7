//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing span)
//!     → middleware/instrument.rs (count method/route/status after the handler)
//!     → middleware/recovery.rs (panic → logged 500)
//!     → /metrics, /health, or the external handler set
//!     → Send to client
//! ```

pub mod middleware;
pub mod server;

pub use server::{AppState, HttpServer, RouteError, HEALTH_PATH};
