//! Request middleware.

pub mod instrument;
pub mod recovery;

pub use instrument::{route_label, track_requests};
pub use recovery::recover_panic;
