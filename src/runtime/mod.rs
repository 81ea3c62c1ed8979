//! The container runtime API, modeled as a capability trait. Callers depend
//! only on the shape of the interface, not on a concrete HTTP/TLS client.

mod client;
mod error;

pub use client::{build_client, DockerApiClient};
pub use error::RuntimeError;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// State of a container as reported by `inspect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerState {
    pub running: bool,
}

/// Destination for demultiplexed (or raw, in TTY mode) log bytes.
///
/// Implemented by [`crate::fifo::FifoWriterPair`]. Kept as a trait so the
/// supervisor and the runtime client can be tested against an in-memory sink.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Prepare the sink to receive writes. For a FIFO this blocks until a
    /// reader attaches; sinks with nothing to prepare can rely on the
    /// default no-op. Called once by the supervisor before its first
    /// `logs` call.
    async fn open(&self, _cancel: &CancellationToken) -> crate::error::Result<()> {
        Ok(())
    }

    async fn write_stdout(&self, buf: &[u8]) -> crate::error::Result<()>;
    async fn write_stderr(&self, buf: &[u8]) -> crate::error::Result<()>;
}

/// Parameters for a single `logs` call.
pub struct LogsOptions<'a> {
    pub container_id: &'a str,
    pub since: i64,
    pub follow: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub raw: bool,
    pub stdout_sink: &'a (dyn LogSink),
    pub stderr_sink: &'a (dyn LogSink),
    pub cancel: CancellationToken,
}

/// Capability set consumed by the streaming supervisor.
///
/// Modeled as a trait rather than an inheritance hierarchy per the design
/// notes: `logs` and `inspect` are the only two operations the supervisor
/// calls polymorphically.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Stream logs until the runtime closes the stream, an error occurs, or
    /// `opts.cancel` fires. Returns once any of those happen.
    async fn logs(&self, opts: LogsOptions<'_>) -> Result<(), RuntimeError>;

    /// Fetch the current state of a container.
    async fn inspect(&self, container_id: &str) -> Result<ContainerState, RuntimeError>;
}
