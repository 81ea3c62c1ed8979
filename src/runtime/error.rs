//! Runtime API error taxonomy, consumed by the terminal-error classifier.

use thiserror::Error;

/// An error returned by the container runtime API.
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    /// An API-level error carrying an HTTP-like status code.
    #[error("runtime api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// `inspect` found no container with the given id.
    #[error("no such container: {0}")]
    NoSuchContainer(String),

    /// Network/transport-level failure talking to the runtime.
    #[error("runtime transport error: {0}")]
    Transport(String),
}

impl RuntimeError {
    /// The HTTP-like status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            RuntimeError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
