//! HTTP service bootstrap and observability core.

pub mod config;
pub mod database;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::AppConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::{Orchestrator, Phase, Shutdown, ShutdownReport};
pub use observability::{Logger, MetricsRegistry};
