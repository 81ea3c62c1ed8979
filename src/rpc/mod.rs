//! RPC surface: two unary methods served over the plugin control channel
//! with `tonic`.

use tonic::{Request, Response, Status};

use crate::forwarder::{Forwarder, StartOpts};

pub mod docklog {
    tonic::include_proto!("docklog");
}

use docklog::docklog_server::Docklog;
use docklog::{StartRequest, StartResponse, StopRequest, StopResponse};

pub use docklog::docklog_client::DocklogClient;
pub use docklog::docklog_server::DocklogServer;

/// Wraps one [`Forwarder`] as a tonic service. The RPC server holds one of
/// these per child process -- a single container's stream per endpoint.
pub struct DocklogService {
    forwarder: Forwarder,
}

impl DocklogService {
    pub fn new(forwarder: Forwarder) -> Self {
        Self { forwarder }
    }
}

impl Default for DocklogService {
    fn default() -> Self {
        Self::new(Forwarder::new())
    }
}

#[tonic::async_trait]
impl Docklog for DocklogService {
    async fn start(
        &self,
        request: Request<StartRequest>,
    ) -> Result<Response<StartResponse>, Status> {
        let req = request.into_inner();
        let opts = StartOpts {
            endpoint: req.endpoint,
            container_id: req.container_id,
            stdout_fifo: req.stdout_fifo,
            stderr_fifo: req.stderr_fifo,
            tls_cert: req.tls_cert,
            tls_key: req.tls_key,
            tls_ca: req.tls_ca,
            tty: req.tty,
            start_time: req.start_time,
        };

        self.forwarder.start(opts).await.map_err(Status::from)?;
        Ok(Response::new(StartResponse {}))
    }

    async fn stop(
        &self,
        _request: Request<StopRequest>,
    ) -> Result<Response<StopResponse>, Status> {
        self.forwarder.stop().await.map_err(Status::from)?;
        Ok(Response::new(StopResponse {}))
    }
}
