//! Forwarder facade.
//!
//! The object the RPC surface drives: exactly two operations, `start` and
//! `stop`, over an Idle -> Running -> Stopped state machine.

use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{DocklogError, Result};
use crate::fifo::FifoWriterPair;
use crate::runtime::build_client;
use crate::supervisor::{self, SupervisorConfig};

/// Parameters for a single `Start` call -- the wire `StartRequest`
/// translated into owned, validated data.
#[derive(Debug, Clone)]
pub struct StartOpts {
    pub endpoint: String,
    pub container_id: String,
    pub stdout_fifo: String,
    pub stderr_fifo: String,
    pub tls_cert: String,
    pub tls_key: String,
    pub tls_ca: String,
    pub tty: bool,
    pub start_time: i64,
}

impl StartOpts {
    /// Reject obviously-malformed options before any I/O is attempted.
    pub fn validate(&self) -> Result<()> {
        if self.container_id.is_empty() {
            return Err(DocklogError::InvalidConfig(
                "container_id must not be empty".to_string(),
            ));
        }
        if self.stdout_fifo.is_empty() {
            return Err(DocklogError::InvalidConfig(
                "stdout_fifo must not be empty".to_string(),
            ));
        }
        if self.stderr_fifo.is_empty() {
            return Err(DocklogError::InvalidConfig(
                "stderr_fifo must not be empty".to_string(),
            ));
        }
        let tls_fields_set =
            !self.tls_cert.is_empty() || !self.tls_key.is_empty() || !self.tls_ca.is_empty();
        let tls_fields_complete =
            !self.tls_cert.is_empty() && !self.tls_key.is_empty() && !self.tls_ca.is_empty();
        if tls_fields_set && !tls_fields_complete {
            return Err(DocklogError::InvalidConfig(
                "tls_cert, tls_key, and tls_ca must all be set or all empty".to_string(),
            ));
        }
        if !self.endpoint.is_empty() && url::Url::parse(&self.endpoint).is_err() {
            return Err(DocklogError::InvalidConfig(format!(
                "endpoint '{}' is not a parseable URL",
                self.endpoint
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForwarderState {
    Idle,
    Running,
    Stopped,
}

struct RunningHandles {
    cancel: CancellationToken,
    done: Mutex<Option<oneshot::Receiver<()>>>,
}

/// One forwarder per active container stream; one per RPC endpoint.
pub struct Forwarder {
    state: Mutex<ForwarderState>,
    running: Mutex<Option<RunningHandles>>,
    fifos: Mutex<Option<Arc<FifoWriterPair>>>,
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl Forwarder {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ForwarderState::Idle),
            running: Mutex::new(None),
            fifos: Mutex::new(None),
        }
    }

    /// Start streaming logs for `opts`. Requires the Forwarder be `Idle`.
    pub async fn start(&self, opts: StartOpts) -> Result<()> {
        opts.validate()?;

        {
            let mut state = self.state.lock().await;
            if *state != ForwarderState::Idle {
                return Err(DocklogError::AlreadyStarted(opts.container_id.clone()));
            }
            *state = ForwarderState::Running;
        }

        let client =
            build_client(&opts.endpoint, &opts.tls_cert, &opts.tls_key, &opts.tls_ca).await?;

        let fifos = FifoWriterPair::new(opts.stdout_fifo.clone(), opts.stderr_fifo.clone());
        *self.fifos.lock().await = Some(Arc::clone(&fifos));

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = oneshot::channel();

        // Publish the cancel handle before the supervisor does anything
        // blocking, so a `Stop` that arrives while the FIFO open is still
        // waiting on a reader can reach the token.
        *self.running.lock().await = Some(RunningHandles {
            cancel: cancel.clone(),
            done: Mutex::new(Some(done_rx)),
        });

        let config = SupervisorConfig {
            container_id: opts.container_id.clone(),
            start_time: opts.start_time,
            tty: opts.tty,
        };
        let sink: Arc<dyn crate::runtime::LogSink> = fifos;
        let runtime: Arc<dyn crate::runtime::RuntimeClient> = Arc::from(client);

        tokio::spawn(supervisor::run(config, runtime, sink, cancel, done_tx));

        Ok(())
    }

    /// Stop streaming. Idempotent, always succeeds, never waits for the
    /// supervisor's `done` signal.
    pub async fn stop(&self) -> Result<()> {
        {
            let running = self.running.lock().await;
            if let Some(handles) = running.as_ref() {
                handles.cancel.cancel();
            }
        }

        if let Some(fifos) = self.fifos.lock().await.as_ref() {
            fifos.close().await;
        }

        *self.state.lock().await = ForwarderState::Stopped;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_container_id() {
        let opts = StartOpts {
            endpoint: String::new(),
            container_id: String::new(),
            stdout_fifo: "/tmp/out".to_string(),
            stderr_fifo: "/tmp/err".to_string(),
            tls_cert: String::new(),
            tls_key: String::new(),
            tls_ca: String::new(),
            tty: false,
            start_time: 0,
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_partial_tls_material() {
        let opts = StartOpts {
            endpoint: "tcp://127.0.0.1:2375".to_string(),
            container_id: "abc".to_string(),
            stdout_fifo: "/tmp/out".to_string(),
            stderr_fifo: "/tmp/err".to_string(),
            tls_cert: "cert".to_string(),
            tls_key: String::new(),
            tls_ca: String::new(),
            tty: false,
            start_time: 0,
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unparseable_endpoint() {
        let opts = StartOpts {
            endpoint: "not a url".to_string(),
            container_id: "abc".to_string(),
            stdout_fifo: "/tmp/out".to_string(),
            stderr_fifo: "/tmp/err".to_string(),
            tls_cert: String::new(),
            tls_key: String::new(),
            tls_ca: String::new(),
            tty: false,
            start_time: 0,
        };
        assert!(matches!(
            opts.validate(),
            Err(DocklogError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_accepts_no_tls_material() {
        let opts = StartOpts {
            endpoint: String::new(),
            container_id: "abc".to_string(),
            stdout_fifo: "/tmp/out".to_string(),
            stderr_fifo: "/tmp/err".to_string(),
            tls_cert: String::new(),
            tls_key: String::new(),
            tls_ca: String::new(),
            tty: false,
            start_time: 0,
        };
        assert!(opts.validate().is_ok());
    }

    #[tokio::test]
    async fn test_stop_before_start_is_a_noop_success() {
        let forwarder = Forwarder::new();
        assert!(forwarder.stop().await.is_ok());
        assert!(forwarder.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_many_times() {
        let forwarder = Forwarder::new();
        for _ in 0..10 {
            assert!(forwarder.stop().await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_opts_without_touching_state() {
        let forwarder = Forwarder::new();
        let opts = StartOpts {
            endpoint: String::new(),
            container_id: String::new(),
            stdout_fifo: String::new(),
            stderr_fifo: String::new(),
            tls_cert: String::new(),
            tls_key: String::new(),
            tls_ca: String::new(),
            tty: false,
            start_time: 0,
        };
        assert!(forwarder.start(opts).await.is_err());
        assert_eq!(*forwarder.state.lock().await, ForwarderState::Idle);
    }

    #[tokio::test]
    async fn test_start_twice_rejects_second_call() {
        let forwarder = Forwarder::new();
        // Force state to Running without going through the full start path
        // (which would require a live runtime endpoint); this isolates the
        // defensive state-machine guard under test.
        *forwarder.state.lock().await = ForwarderState::Running;
        let opts = StartOpts {
            endpoint: String::new(),
            container_id: "abc".to_string(),
            stdout_fifo: "/tmp/out".to_string(),
            stderr_fifo: "/tmp/err".to_string(),
            tls_cert: String::new(),
            tls_key: String::new(),
            tls_ca: String::new(),
            tty: false,
            start_time: 0,
        };
        let result = forwarder.start(opts).await;
        assert!(matches!(result, Err(DocklogError::AlreadyStarted(_))));
    }
}
