use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{handle_request, SharedState};

pub struct ProxyServer {
    addr: SocketAddr,
    state: SharedState,
    semaphore: Arc<Semaphore>,
}

impl ProxyServer {
    pub fn new(addr: SocketAddr, state: SharedState, max_connections: usize) -> Self {
        Self {
            addr,
            state,
            semaphore: Arc::new(Semaphore::new(max_connections.max(1))),
        }
    }

    /// Accepts connections until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) -> io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(
            addr = %listener.local_addr()?,
            max_connections = self.semaphore.available_permits(),
            "Video cache server listening"
        );

        tokio::pin!(shutdown);
        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    info!("Shutting down server");
                    return Ok(());
                }
            };

            let state = self.state.clone();
            let semaphore = self.semaphore.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| handle_request(req, state.clone(), semaphore.clone()));
                if let Err(e) = Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    debug!(%peer, error = %e, "Connection closed with error");
                }
            });
        }
    }
}
