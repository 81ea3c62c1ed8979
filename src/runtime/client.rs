//! Runtime client factory.
//!
//! Selects one of three construction strategies from `StartOpts`: derive from
//! the environment, connect with mutual TLS, or connect over plaintext. The
//! actual wire protocol is delegated to `bollard`, the container runtime's
//! own client library -- this crate owns only the selection logic and the
//! translation of its errors into our taxonomy.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::DocklogError;
use crate::runtime::{ContainerState, LogSink, LogsOptions, RuntimeClient, RuntimeError};

/// Adapts `bollard::Docker` to the [`RuntimeClient`] capability trait.
pub struct DockerApiClient {
    docker: bollard::Docker,
}

/// Build a runtime client for the given endpoint and TLS material.
///
/// - `endpoint` empty: derive the connection from the environment
///   (`DOCKER_HOST`, `DOCKER_TLS_VERIFY`, `DOCKER_CERT_PATH`).
/// - `endpoint` set, any TLS field non-empty: mutual TLS with the supplied CA,
///   cert, and key.
/// - `endpoint` set, all TLS fields empty: plaintext.
///
/// Any failure is fatal for the caller's `Start` call.
pub async fn build_client(
    endpoint: &str,
    tls_cert: &str,
    tls_key: &str,
    tls_ca: &str,
) -> Result<Box<dyn RuntimeClient>, DocklogError> {
    let docker = connect(endpoint, tls_cert, tls_key, tls_ca).await?;
    Ok(Box::new(DockerApiClient { docker }))
}

async fn connect(
    endpoint: &str,
    tls_cert: &str,
    tls_key: &str,
    tls_ca: &str,
) -> Result<bollard::Docker, DocklogError> {
    if endpoint.is_empty() {
        tracing::debug!("deriving runtime client from environment");
        return bollard::Docker::connect_with_local_defaults()
            .map_err(|e| DocklogError::ClientConstruction("environment".to_string(), e.to_string()));
    }

    if tls_cert.is_empty() && tls_key.is_empty() && tls_ca.is_empty() {
        tracing::debug!(endpoint, "connecting to runtime over plaintext");
        return bollard::Docker::connect_with_http(endpoint, 120, bollard::API_DEFAULT_VERSION)
            .map_err(|e| DocklogError::ClientConstruction(endpoint.to_string(), e.to_string()));
    }

    tracing::debug!(endpoint, "connecting to runtime over mutual TLS");
    connect_with_tls_material(endpoint, tls_cert, tls_key, tls_ca).await
}

/// `bollard::Docker::connect_with_ssl` takes file paths, but `StartOpts`
/// carries PEM bytes on the wire. Materialize them into a scratch directory
/// for the duration of the connect call.
async fn connect_with_tls_material(
    endpoint: &str,
    tls_cert: &str,
    tls_key: &str,
    tls_ca: &str,
) -> Result<bollard::Docker, DocklogError> {
    let construction_err = |e: std::io::Error| {
        DocklogError::ClientConstruction(endpoint.to_string(), e.to_string())
    };

    let dir = tempfile::tempdir().map_err(construction_err)?;
    let cert_path = dir.path().join("cert.pem");
    let key_path = dir.path().join("key.pem");
    let ca_path = dir.path().join("ca.pem");

    tokio::fs::write(&cert_path, tls_cert)
        .await
        .map_err(construction_err)?;
    tokio::fs::write(&key_path, tls_key)
        .await
        .map_err(construction_err)?;
    tokio::fs::write(&ca_path, tls_ca)
        .await
        .map_err(construction_err)?;

    connect_with_ssl_paths(endpoint, &key_path, &cert_path, &ca_path)
        .map_err(|e| DocklogError::ClientConstruction(endpoint.to_string(), e.to_string()))
}

fn connect_with_ssl_paths(
    endpoint: &str,
    key_path: &Path,
    cert_path: &Path,
    ca_path: &Path,
) -> Result<bollard::Docker, bollard::errors::Error> {
    bollard::Docker::connect_with_ssl(
        endpoint,
        key_path,
        cert_path,
        ca_path,
        120,
        bollard::API_DEFAULT_VERSION,
    )
}

#[async_trait]
impl RuntimeClient for DockerApiClient {
    async fn logs(&self, opts: LogsOptions<'_>) -> Result<(), RuntimeError> {
        let options = bollard::container::LogsOptions::<String> {
            follow: opts.follow,
            stdout: opts.stdout,
            stderr: opts.stderr,
            since: opts.since,
            timestamps: false,
            tail: "all".to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.logs(opts.container_id, Some(options));
        while let Some(chunk) = stream.next().await {
            if opts.cancel.is_cancelled() {
                return Ok(());
            }
            let chunk = chunk.map_err(map_bollard_error)?;
            write_chunk(chunk, opts.stdout_sink, opts.stderr_sink).await?;
        }
        Ok(())
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerState, RuntimeError> {
        let resp = self
            .docker
            .inspect_container(container_id, None)
            .await
            .map_err(map_bollard_error)?;
        let running = resp.state.and_then(|s| s.running).unwrap_or(false);
        Ok(ContainerState { running })
    }
}

async fn write_chunk(
    chunk: bollard::container::LogOutput,
    stdout_sink: &dyn LogSink,
    stderr_sink: &dyn LogSink,
) -> Result<(), RuntimeError> {
    let sink_err = |e: DocklogError| RuntimeError::Transport(e.to_string());
    match chunk {
        bollard::container::LogOutput::StdOut { message } => {
            stdout_sink.write_stdout(&message).await.map_err(sink_err)
        }
        bollard::container::LogOutput::StdErr { message } => {
            stderr_sink.write_stderr(&message).await.map_err(sink_err)
        }
        // TTY mode: the runtime delivers one undemultiplexed stream, written
        // to stdout only -- the stderr FIFO is simply left idle.
        bollard::container::LogOutput::Console { message } => {
            stdout_sink.write_stdout(&message).await.map_err(sink_err)
        }
        bollard::container::LogOutput::StdIn { .. } => Ok(()),
    }
}

fn map_bollard_error(err: bollard::errors::Error) -> RuntimeError {
    match &err {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => {
            if *status_code == 404 {
                RuntimeError::NoSuchContainer(message.clone())
            } else {
                RuntimeError::Api {
                    status: *status_code,
                    message: message.clone(),
                }
            }
        }
        other => RuntimeError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_plaintext_branch_selected() {
        // `connect_with_http` only parses the address and builds the HTTP
        // client; it doesn't probe the daemon, so a syntactically valid
        // endpoint with no TLS material succeeds here even with nothing
        // listening. A success therefore pins down that this took the
        // plaintext branch rather than the TLS-material branch, which would
        // need actual cert/key/ca files to materialize.
        let result = connect("tcp://127.0.0.1:1", "", "", "").await;
        assert!(result.is_ok(), "expected plaintext connect to succeed without touching the network: {result:?}");
    }

    #[tokio::test]
    async fn test_connect_tls_material_materializes_files() {
        let result =
            connect_with_tls_material("tcp://127.0.0.1:1", "cert", "key", "ca").await;
        // The daemon endpoint is unreachable, so this fails downstream of
        // writing the temp files -- but it must attempt the TLS branch
        // specifically, not silently fall back to plaintext or environment.
        assert!(result.is_err());
    }

    #[test]
    fn test_map_bollard_404_is_no_such_container() {
        let err = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "no such container: abc".to_string(),
        };
        assert!(matches!(
            map_bollard_error(err),
            RuntimeError::NoSuchContainer(_)
        ));
    }

    #[test]
    fn test_map_bollard_501_is_api_error() {
        let err = bollard::errors::Error::DockerResponseServerError {
            status_code: 501,
            message: "configured logging driver does not support reading".to_string(),
        };
        match map_bollard_error(err) {
            RuntimeError::Api { status, .. } => assert_eq!(status, 501),
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
