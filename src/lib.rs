//! docklog — container log forwarder plugin for workload-orchestrator
//! container task drivers.
//!
//! Runs as a child process of an orchestrator's task driver, streaming a
//! single container's stdout/stderr into a pair of named pipes until told
//! to stop. The parent role (spawning, handshaking with, and dialing the
//! child) is exposed as a library, not a standalone CLI surface.

pub mod backoff;
pub mod classify;
pub mod error;
pub mod fifo;
pub mod forwarder;
pub mod plugin;
pub mod rpc;
pub mod runtime;
pub mod supervisor;

pub use error::{DocklogError, Result};
pub use forwarder::{Forwarder, StartOpts};
pub use plugin::{bootstrap_if_plugin, launch, reattach, teardown, PluginClient, PLUGIN_NAME};
pub use runtime::{ContainerState, LogSink, RuntimeClient, RuntimeError};
