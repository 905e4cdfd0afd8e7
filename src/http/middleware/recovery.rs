//! Panic recovery for the request path.
//!
//! A panic inside one request becomes a logged 500; the connection task and
//! every other request keep running. Startup is not covered.

use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Panic handler for `tower_http::catch_panic::CatchPanicLayer`.
pub fn recover_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    tracing::warn!(
        panic = %panic_message(&*panic),
        "Recovered from panic in request handler"
    );
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else {
        "<non-string panic payload>"
    }
}
