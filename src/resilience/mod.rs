//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Startup dependency connect:
//!     → attempt fails
//!     → backoff.rs (delay before next attempt)
//!     → give up after the configured attempt budget
//! ```
//!
//! # Design Decisions
//! - Retries are bounded; startup never loops forever
//! - Jittered backoff avoids synchronized reconnect storms across replicas

pub mod backoff;

pub use backoff::Backoff;
