//! Plugin lifecycle.
//!
//! The binary doubles as both the parent (orchestrator-facing library) and
//! the plugin child. `bootstrap_if_plugin` is the first thing `main` calls;
//! if the process was invoked as the plugin, it never returns.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::process::{Child, Command};
use tonic::transport::{Channel, Endpoint, Server};
use tower::service_fn;

use crate::error::{DocklogError, Result};
use crate::forwarder::Forwarder;
use crate::rpc::{DocklogClient, DocklogServer, DocklogService};

/// The literal first-argument value that puts the process into plugin mode.
pub const PLUGIN_NAME: &str = "docker_logger";

const MAGIC_COOKIE_ENV: &str = "DOCKLOG_MAGIC_COOKIE";
const MAGIC_COOKIE_VALUE: &str = "docklog-magic-cookie-v1";
const CORE_PROTOCOL_VERSION: u32 = 1;
const APP_PROTOCOL_VERSION: u32 = 1;

/// A dialed connection to a running plugin child.
pub struct PluginClient {
    pub client: DocklogClient<Channel>,
    pub child: Option<Child>,
    pub socket_path: PathBuf,
}

/// If the process was invoked in plugin mode (`argv[1] == PLUGIN_NAME`),
/// serve the RPC surface and never return -- the process exits from inside
/// this function. Must be the first statement evaluated in `main`, before
/// the CLI parser or any parent-role tracing setup runs.
pub async fn bootstrap_if_plugin() {
    let is_plugin = std::env::args().nth(1).as_deref() == Some(PLUGIN_NAME);
    if !is_plugin {
        return;
    }

    init_plugin_logging();

    match run_plugin_child().await {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            tracing::error!(error = %err, "plugin bootstrap failed");
            std::process::exit(1);
        }
    }
}

fn init_plugin_logging() {
    tracing_subscriber::fmt()
        .json()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_plugin_child() -> Result<()> {
    let expected_cookie = std::env::var(MAGIC_COOKIE_ENV)
        .map_err(|_| DocklogError::HandshakeFailed("magic cookie env var missing".to_string()))?;
    if expected_cookie != MAGIC_COOKIE_VALUE {
        return Err(DocklogError::HandshakeFailed(
            "magic cookie mismatch".to_string(),
        ));
    }

    let socket_dir = tempfile::tempdir()
        .map_err(|e| DocklogError::HandshakeFailed(format!("failed to create socket dir: {e}")))?;
    let socket_path = socket_dir.path().join("docklog.sock");

    let listener = UnixListener::bind(&socket_path)
        .map_err(|e| DocklogError::HandshakeFailed(format!("failed to bind socket: {e}")))?;

    println!(
        "{}|{}|unix|{}|grpc",
        CORE_PROTOCOL_VERSION,
        APP_PROTOCOL_VERSION,
        socket_path.display()
    );
    use std::io::Write;
    std::io::stdout()
        .flush()
        .map_err(|e| DocklogError::HandshakeFailed(e.to_string()))?;

    let service = DocklogService::new(Forwarder::new());
    let incoming = tokio_stream::wrappers::UnixListenerStream::new(listener);

    let serve = Server::builder()
        .add_service(DocklogServer::new(service))
        .serve_with_incoming(incoming);

    tokio::select! {
        result = serve => {
            result.map_err(|e| DocklogError::Transport(e.to_string()))?;
        }
        _ = wait_for_stdin_eof() => {
            tracing::info!("stdin closed, shutting down");
        }
    }

    drop(socket_dir);
    Ok(())
}

async fn wait_for_stdin_eof() {
    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 1];
    loop {
        match stdin.read(&mut buf).await {
            Ok(0) => return,
            Ok(_) => continue,
            Err(_) => return,
        }
    }
}

/// Spawn the current executable as a plugin child and dial it.
pub async fn launch() -> Result<PluginClient> {
    let exe = std::env::current_exe()
        .map_err(|e| DocklogError::HandshakeFailed(format!("cannot resolve current_exe: {e}")))?;

    let mut child = Command::new(&exe)
        .arg(PLUGIN_NAME)
        .env(MAGIC_COOKIE_ENV, MAGIC_COOKIE_VALUE)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| DocklogError::HandshakeFailed(format!("failed to spawn plugin: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| DocklogError::HandshakeFailed("plugin stdout not piped".to_string()))?;
    let mut lines = BufReader::new(stdout).lines();
    let line = lines
        .next_line()
        .await
        .map_err(|e| DocklogError::HandshakeFailed(e.to_string()))?
        .ok_or_else(|| DocklogError::HandshakeFailed("plugin exited before handshake".to_string()))?;

    let (network_type, network_address) = parse_handshake(&line)?;
    if network_type != "unix" {
        return Err(DocklogError::HandshakeFailed(format!(
            "unsupported transport '{network_type}'"
        )));
    }

    let client = dial_unix(&network_address).await?;

    Ok(PluginClient {
        client,
        child: Some(child),
        socket_path: PathBuf::from(network_address),
    })
}

/// Reconnect to an already-running plugin child given its previously
/// captured socket path. Used after a parent restart.
pub async fn reattach(socket_path: &str) -> Result<PluginClient> {
    let client = dial_unix(socket_path).await?;
    Ok(PluginClient {
        client,
        child: None,
        socket_path: PathBuf::from(socket_path),
    })
}

fn parse_handshake(line: &str) -> Result<(String, String)> {
    let fields: Vec<&str> = line.trim().split('|').collect();
    if fields.len() != 5 {
        return Err(DocklogError::HandshakeFailed(format!(
            "malformed handshake line: {line}"
        )));
    }
    let [core_version, app_version, network_type, network_address, protocol] = [
        fields[0], fields[1], fields[2], fields[3], fields[4],
    ];
    if core_version != CORE_PROTOCOL_VERSION.to_string() {
        return Err(DocklogError::HandshakeFailed(format!(
            "unsupported core protocol version {core_version}"
        )));
    }
    if app_version != APP_PROTOCOL_VERSION.to_string() {
        return Err(DocklogError::HandshakeFailed(format!(
            "unsupported app protocol version {app_version}"
        )));
    }
    if protocol != "grpc" {
        return Err(DocklogError::HandshakeFailed(format!(
            "unsupported protocol tag {protocol}"
        )));
    }
    Ok((network_type.to_string(), network_address.to_string()))
}

async fn dial_unix(socket_path: &str) -> Result<DocklogClient<Channel>> {
    let path = socket_path.to_string();
    let channel = Endpoint::try_from("http://[::]:50051")
        .map_err(|e| DocklogError::Transport(e.to_string()))?
        .connect_with_connector(service_fn(move |_: tonic::transport::Uri| {
            let path = path.clone();
            async move { UnixStream::connect(path).await }
        }))
        .await
        .map_err(|e| DocklogError::Transport(e.to_string()))?;
    Ok(DocklogClient::new(channel))
}

/// Ask the plugin child to shut down gracefully by closing its stdin, then
/// reap it. The parent is responsible for not leaving orphans.
pub async fn teardown(plugin: &mut PluginClient) -> Result<()> {
    if let Some(child) = plugin.child.as_mut() {
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.shutdown().await;
        }
        child
            .wait()
            .await
            .map_err(|e| DocklogError::Transport(e.to_string()))?;
    }
    Ok(())
}
