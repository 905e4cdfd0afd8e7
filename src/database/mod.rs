//! Database connection pool subsystem.
//!
//! # Data Flow
//! ```text
//! DatabaseConfig (url from DB_URL)
//!     → pool.rs (bounded connect attempts with backoff)
//!     → Database (shared, read-mostly handle)
//!     → borrowed by request handlers via AppState
//!     → closed by the orchestrator after draining
//! ```
//!
//! # Design Decisions
//! - Owns pool lifecycle only; no query logic lives here
//! - Unreachable database is fatal to startup
//! - Connection strings are redacted before they reach logs or errors

pub mod pool;

pub use pool::{redact, Database, DatabaseError, PoolStats};
