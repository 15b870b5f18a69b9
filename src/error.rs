//! Error types surfaced by the DSP session

use thiserror::Error;

/// Errors returned to the host when issuing actions against a session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Action attempted while the transport is not connected.
    ///
    /// The session restarts itself when this is returned.
    #[error("not connected to DSP")]
    NotConnected,

    /// Transport reported a failure (refused, reset, closed)
    #[error("transport error: {0}")]
    Transport(String),

    /// Caller-supplied parameter outside its documented bounds
    #[error("{field} out of range: {value} (must be {min}-{max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// Session actor has shut down
    #[error("session closed")]
    Closed,
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
