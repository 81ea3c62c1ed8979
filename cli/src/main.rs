//! docklog — parent/demo entry point.
//!
//! The very first statement in `main` checks whether this process was
//! invoked as the plugin child; if so it never returns past that check.
//! Everything below is the parent-role demo harness: it exercises
//! `launch`/`reattach` against a running plugin and drives `Start`/`Stop`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use docklog::rpc::docklog::{StartRequest, StopRequest};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "docklog",
    version,
    about = "Container log forwarder plugin for workload-orchestrator container task drivers"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch a plugin child and ask it to start forwarding one container's logs.
    Start {
        #[arg(long)]
        endpoint: String,
        #[arg(long)]
        container_id: String,
        #[arg(long)]
        stdout_fifo: String,
        #[arg(long)]
        stderr_fifo: String,
        #[arg(long, default_value_t = false)]
        tty: bool,
    },
    /// Reattach to an already-running plugin child by its socket path and stop it.
    Stop {
        #[arg(long)]
        socket_path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    docklog::bootstrap_if_plugin().await;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            endpoint,
            container_id,
            stdout_fifo,
            stderr_fifo,
            tty,
        } => run_start(endpoint, container_id, stdout_fifo, stderr_fifo, tty).await,
        Commands::Stop { socket_path } => run_stop(socket_path).await,
    }
}

async fn run_start(
    endpoint: String,
    container_id: String,
    stdout_fifo: String,
    stderr_fifo: String,
    tty: bool,
) -> Result<()> {
    let mut plugin = docklog::launch()
        .await
        .map_err(|e| anyhow::anyhow!("failed to launch docklog plugin: {e}"))?;

    tracing::info!(socket_path = %plugin.socket_path.display(), "plugin launched");

    plugin
        .client
        .start(StartRequest {
            endpoint,
            container_id: container_id.clone(),
            stdout_fifo,
            stderr_fifo,
            tls_cert: String::new(),
            tls_key: String::new(),
            tls_ca: String::new(),
            tty,
            start_time: 0,
        })
        .await
        .map_err(|e| anyhow::anyhow!("start rpc failed: {e}"))?;

    tracing::info!(container_id = %container_id, "forwarding started");
    println!("{}", plugin.socket_path.display());
    Ok(())
}

async fn run_stop(socket_path: String) -> Result<()> {
    let mut plugin = docklog::reattach(&socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to reattach to docklog plugin: {e}"))?;

    plugin
        .client
        .stop(StopRequest {})
        .await
        .map_err(|e| anyhow::anyhow!("stop rpc failed: {e}"))?;

    docklog::teardown(&mut plugin)
        .await
        .map_err(|e| anyhow::anyhow!("teardown failed: {e}"))?;

    tracing::info!("forwarding stopped");
    Ok(())
}
