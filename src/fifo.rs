//! FIFO writer pair.
//!
//! Owns up to two named-pipe write handles. Opening a FIFO for writing
//! blocks at the OS level until a reader attaches, so the open syscall runs
//! on a blocking thread and the pair's mutex is never held across it.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{DocklogError, Result};
use crate::runtime::LogSink;

#[derive(Default)]
struct Handles {
    stdout: Option<File>,
    stderr: Option<File>,
}

/// Holds the write ends of the stdout and stderr FIFOs for one container.
pub struct FifoWriterPair {
    stdout_path: String,
    stderr_path: String,
    handles: Mutex<Handles>,
}

impl FifoWriterPair {
    pub fn new(stdout_path: String, stderr_path: String) -> Arc<Self> {
        Arc::new(Self {
            stdout_path,
            stderr_path,
            handles: Mutex::new(Handles::default()),
        })
    }

    /// Clear and drop both handles, if present. Safe to call repeatedly and
    /// concurrently with `open` or in-flight writes.
    pub async fn close(&self) {
        let (stdout, stderr) = {
            let mut handles = self.handles.lock().await;
            (handles.stdout.take(), handles.stderr.take())
        };
        drop(stdout);
        drop(stderr);
    }
}

async fn open_fifo_write_end(path: String) -> Result<File> {
    let path_for_open = path.clone();
    let path_for_join_err = path.clone();
    let std_file = tokio::task::spawn_blocking(move || {
        std::fs::OpenOptions::new().write(true).open(&path_for_open)
    })
    .await
    .map_err(|e| DocklogError::FifoOpenFailed(path_for_join_err, e.to_string()))?
    .map_err(|e| DocklogError::FifoOpenFailed(path, e.to_string()))?;
    Ok(File::from_std(std_file))
}

#[async_trait]
impl LogSink for FifoWriterPair {
    /// Open whichever write ends are not already open, in stdout-then-stderr
    /// order. Blocks until readers attach to both. Returns
    /// `DocklogError::Cancelled` if `cancel` fires before the handles could
    /// be published, dropping anything opened in the meantime.
    async fn open(&self, cancel: &CancellationToken) -> Result<()> {
        let (need_stdout, need_stderr) = {
            let handles = self.handles.lock().await;
            (handles.stdout.is_none(), handles.stderr.is_none())
        };

        if !need_stdout && !need_stderr {
            return Ok(());
        }

        let stdout = if need_stdout {
            Some(open_fifo_write_end(self.stdout_path.clone()).await?)
        } else {
            None
        };
        let stderr = if need_stderr {
            Some(open_fifo_write_end(self.stderr_path.clone()).await?)
        } else {
            None
        };

        if cancel.is_cancelled() {
            // Opened handles drop here, closing the fds; publish nothing.
            return Err(DocklogError::Cancelled);
        }

        let mut handles = self.handles.lock().await;
        if let Some(f) = stdout {
            handles.stdout = Some(f);
        }
        if let Some(f) = stderr {
            handles.stderr = Some(f);
        }
        Ok(())
    }

    async fn write_stdout(&self, buf: &[u8]) -> Result<()> {
        let mut handles = self.handles.lock().await;
        match handles.stdout.as_mut() {
            Some(f) => f
                .write_all(buf)
                .await
                .map_err(|e| DocklogError::Transport(e.to_string())),
            None => Ok(()),
        }
    }

    async fn write_stderr(&self, buf: &[u8]) -> Result<()> {
        let mut handles = self.handles.lock().await;
        match handles.stderr.as_mut() {
            Some(f) => f
                .write_all(buf)
                .await
                .map_err(|e| DocklogError::Transport(e.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn mkfifo(path: &std::path::Path) {
        nix::unistd::mkfifo(path, nix::sys::stat::Mode::S_IRWXU).unwrap();
    }

    #[tokio::test]
    async fn test_open_blocks_until_reader_attaches_then_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let stdout_path = dir.path().join("stdout.fifo");
        let stderr_path = dir.path().join("stderr.fifo");
        mkfifo(&stdout_path);
        mkfifo(&stderr_path);

        let pair = FifoWriterPair::new(
            stdout_path.to_str().unwrap().to_string(),
            stderr_path.to_str().unwrap().to_string(),
        );
        let cancel = CancellationToken::new();

        let pair_clone = Arc::clone(&pair);
        let cancel_clone = cancel.clone();
        let open_task = tokio::spawn(async move { pair_clone.open(&cancel_clone).await });

        // Give the open call a moment to reach its blocking syscalls before
        // attaching readers.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let _stdout_reader = tokio::task::spawn_blocking(move || {
            std::fs::OpenOptions::new().read(true).open(stdout_path)
        })
        .await
        .unwrap()
        .unwrap();
        let _stderr_reader = tokio::task::spawn_blocking(move || {
            std::fs::OpenOptions::new().read(true).open(stderr_path)
        })
        .await
        .unwrap()
        .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), open_task)
            .await
            .expect("open did not complete")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let stdout_path = dir.path().join("stdout.fifo");
        let stderr_path = dir.path().join("stderr.fifo");
        mkfifo(&stdout_path);
        mkfifo(&stderr_path);

        let pair = FifoWriterPair::new(
            stdout_path.to_str().unwrap().to_string(),
            stderr_path.to_str().unwrap().to_string(),
        );

        pair.close().await;
        pair.close().await;
        pair.close().await;
    }

    #[tokio::test]
    async fn test_write_with_no_handle_is_a_silent_noop() {
        let pair = FifoWriterPair::new("/nonexistent/stdout".to_string(), "/nonexistent/stderr".to_string());
        assert!(pair.write_stdout(b"hello").await.is_ok());
        assert!(pair.write_stderr(b"hello").await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_during_blocking_open_is_cancelled_and_leaks_nothing() {
        // Cancel fires while both opens are still blocked on their readers.
        // Once readers do attach (simulating the eventual syscall return),
        // `open` must observe the cancellation and return `Cancelled` rather
        // than publishing either handle.
        let dir = tempfile::tempdir().unwrap();
        let stdout_path = dir.path().join("stdout.fifo");
        let stderr_path = dir.path().join("stderr.fifo");
        mkfifo(&stdout_path);
        mkfifo(&stderr_path);

        let pair = FifoWriterPair::new(
            stdout_path.to_str().unwrap().to_string(),
            stderr_path.to_str().unwrap().to_string(),
        );
        let cancel = CancellationToken::new();

        let pair_clone = Arc::clone(&pair);
        let cancel_clone = cancel.clone();
        let open_task = tokio::spawn(async move { pair_clone.open(&cancel_clone).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let stdout_path_for_reader = stdout_path.clone();
        let _stdout_reader = tokio::task::spawn_blocking(move || {
            std::fs::OpenOptions::new().read(true).open(stdout_path_for_reader)
        })
        .await
        .unwrap()
        .unwrap();
        let _stderr_reader = tokio::task::spawn_blocking(move || {
            std::fs::OpenOptions::new().read(true).open(stderr_path)
        })
        .await
        .unwrap()
        .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), open_task)
            .await
            .expect("open did not complete")
            .unwrap();
        assert!(matches!(result, Err(DocklogError::Cancelled)));
    }
}
