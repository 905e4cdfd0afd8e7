//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, routed by level)
//!     → metrics.rs (request counters)
//!
//! Consumers:
//!     → stdout (info/warn) and stderr (error) JSON streams
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Logger and registry are explicit values, never ambient globals
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

pub use logging::{Logger, LoggerError};
pub use metrics::{CounterDefinition, CounterHandle, MetricsError, MetricsRegistry, HTTP_REQUESTS_TOTAL};
