//! Typed simulator failures.
//!
//! Only one distinction matters to the rest of the crate: whether the
//! transport to the simulator went away ([`SimulatorError::Connection`]) or
//! the simulator answered with something we could not use. The first kind
//! restarts the whole run; every other kind is fatal.

use thiserror::Error;

/// Errors raised by a [`SimulatorClient`](super::SimulatorClient).
#[derive(Debug, Error)]
pub enum SimulatorError {
    /// The transport is down: refused, reset, or timed out.
    #[error("simulator connection failed: {0}")]
    Connection(String),

    /// The simulator answered with a non-success status.
    #[error("simulator returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("malformed simulator response: {0}")]
    Decode(String),

    /// A request arrived out of order (e.g. reading a frame before an
    /// episode was started).
    #[error("simulator protocol violation: {0}")]
    Protocol(String),
}

impl SimulatorError {
    /// Whether this error means the connection itself was lost.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<reqwest::Error> for SimulatorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
            Self::Connection(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            Self::Protocol(err.to_string())
        }
    }
}

/// Walk an [`anyhow::Error`] chain looking for a lost connection.
///
/// Context layers added with `.context(..)` are skipped, so call sites are
/// free to annotate simulator errors.
pub fn is_connection_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<SimulatorError>()
            .is_some_and(SimulatorError::is_connection)
    })
}
