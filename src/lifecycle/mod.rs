//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (orchestrator.rs):
//!     Logger → Metrics → Pool → Bind → Serve (spawned task)
//!
//! Shutdown (orchestrator.rs + shutdown.rs):
//!     Signal received → Stop accepting → Drain (bounded) → Close pool → Flush logs
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → one termination event
//! ```
//!
//! # Design Decisions
//! - Ordered startup: any failure before serving is fatal
//! - Listener binds last (traffic only when ready)
//! - Shutdown has a deadline: forced exit after it, exit code unchanged

pub mod orchestrator;
pub mod shutdown;
pub mod signals;

pub use orchestrator::{LifecycleError, Orchestrator, Phase, ShutdownReport};
pub use shutdown::Shutdown;
pub use signals::{Signal, Termination};
