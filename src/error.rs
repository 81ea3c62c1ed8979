//! Error types for docklog operations.

use thiserror::Error;

/// Main error type for docklog operations.
#[derive(Error, Debug, Clone)]
pub enum DocklogError {
    /// `StartOpts` failed validation.
    #[error("invalid start options: {0}")]
    InvalidConfig(String),

    /// Runtime client construction failed for a container.
    #[error("failed to construct runtime client for '{0}': {1}")]
    ClientConstruction(String, String),

    /// Opening a FIFO write end failed.
    #[error("failed to open fifo '{0}': {1}")]
    FifoOpenFailed(String, String),

    /// An operation observed cancellation before it could complete.
    #[error("cancelled")]
    Cancelled,

    /// The streaming loop hit an error that will never resolve with retries.
    #[error("terminal streaming error for container '{0}': {1}")]
    TerminalStreamError(String, String),

    /// A FIFO write or RPC transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The plugin handshake failed or was rejected.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// `Start` was called on a `Forwarder` that is not `Idle`.
    #[error("forwarder for container '{0}' already started")]
    AlreadyStarted(String),
}

/// Result type alias for docklog operations.
pub type Result<T> = std::result::Result<T, DocklogError>;

impl From<DocklogError> for tonic::Status {
    fn from(err: DocklogError) -> Self {
        match err {
            DocklogError::InvalidConfig(_) => tonic::Status::invalid_argument(err.to_string()),
            DocklogError::AlreadyStarted(_) => tonic::Status::failed_precondition(err.to_string()),
            DocklogError::ClientConstruction(..) | DocklogError::FifoOpenFailed(..) => {
                tonic::Status::unavailable(err.to_string())
            }
            _ => tonic::Status::internal(err.to_string()),
        }
    }
}
