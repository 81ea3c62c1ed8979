//! Streaming supervisor -- the core loop of the forwarder.
//!
//! Owns the loop that keeps a container's log stream flowing into its FIFO
//! pair from the moment `Start` succeeds until `Stop` is called or a
//! terminal error occurs. One instance per active `Forwarder`, running on
//! its own `tokio::spawn`ed task.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backoff::next_backoff;
use crate::classify::is_terminal;
use crate::runtime::{LogSink, LogsOptions, RuntimeClient};

/// Parameters a supervisor task needs for the lifetime of one container's
/// stream. Plain data, constructed once by `Forwarder::start`.
pub struct SupervisorConfig {
    pub container_id: String,
    pub start_time: i64,
    pub tty: bool,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Run the supervisor loop to completion, firing `done` on exit.
///
/// `runtime` and the sinks are borrowed for the task's full lifetime; the
/// caller is expected to spawn this as its own task and hold no other
/// reference to the Forwarder from inside it (see design notes on avoiding
/// cyclic ownership).
pub async fn run(
    config: SupervisorConfig,
    runtime: Arc<dyn RuntimeClient>,
    sinks: Arc<dyn LogSink>,
    cancel: CancellationToken,
    done: oneshot::Sender<()>,
) {
    if let Err(err) = sinks.open(&cancel).await {
        if !matches!(err, crate::error::DocklogError::Cancelled) {
            error!(container_id = %config.container_id, error = %err, "failed to open fifo pair, supervisor exiting");
        }
        let _ = done.send(());
        return;
    }

    let mut since = config.start_time;
    let mut backoff = 0.0_f64;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let outcome = runtime
            .logs(LogsOptions {
                container_id: &config.container_id,
                since,
                follow: true,
                stdout: true,
                stderr: true,
                raw: config.tty,
                stdout_sink: sinks.as_ref(),
                stderr_sink: sinks.as_ref(),
                cancel: cancel.clone(),
            })
            .await;

        if cancel.is_cancelled() {
            break;
        }

        match outcome {
            Ok(()) => {
                backoff = 0.0;
            }
            Err(err) if is_terminal(&err) => {
                error!(container_id = %config.container_id, error = %err, "terminal streaming error, supervisor exiting");
                break;
            }
            Err(err) => {
                backoff = next_backoff(backoff);
                warn!(
                    container_id = %config.container_id,
                    error = %err,
                    retry_in_secs = backoff,
                    "transient streaming error, retrying"
                );
                // Intentionally not cancellation-interruptible; the next
                // loop iteration re-checks the token as soon as the sleep
                // returns.
                tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
            }
        }

        since = now_secs();

        match runtime.inspect(&config.container_id).await {
            Ok(state) if state.running => continue,
            Ok(_) => {
                info!(container_id = %config.container_id, "container no longer running, supervisor exiting");
                break;
            }
            Err(err) => {
                info!(container_id = %config.container_id, error = %err, "inspect failed, supervisor exiting");
                break;
            }
        }
    }

    let _ = done.send(());
}
