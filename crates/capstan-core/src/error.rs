//! Error types for the endpoint driver.
//!
//! The driver itself never fails: pushes are infallible and all error
//! signaling happens through state introspection and per-write callbacks.
//! [`EndpointError`] is the reason value carried by a terminal transition.

use thiserror::Error;

/// Reason an endpoint was torn down.
///
/// Supplied to [`move_to_error_state`] and forwarded verbatim to the write
/// callback of every pending write. The driver stores and forwards the value;
/// it never branches on it.
///
/// [`move_to_error_state`]: crate::EndpointDriver::move_to_error_state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// The underlying transport is not open.
    #[error("transport not open: {0}")]
    NotOpen(String),

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer violated the record protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Failure with no more specific classification.
    #[error("endpoint error: {0}")]
    Unknown(String),
}
