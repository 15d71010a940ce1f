//! Admin API server.

use crate::admin_api::router::route_request;
use crate::catalog::Catalog;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Admin API server for tapedeck
pub struct AdminApiServer {
    addr: SocketAddr,
    catalog: Arc<Catalog>,
}

impl AdminApiServer {
    pub fn new(addr: SocketAddr, catalog: Arc<Catalog>) -> Self {
        Self { addr, catalog }
    }

    /// Bind and serve until the task is dropped.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        info!("Tapedeck admin API listening on http://{}", listener.local_addr()?);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let catalog = Arc::clone(&self.catalog);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let catalog = Arc::clone(&catalog);
                    async move { route_request(req, catalog).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Admin API connection error: {}", e);
                }
            });
        }
    }
}
