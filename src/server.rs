//! Listener ownership for the target service stub.
//!
//! Connections are served on tasks tracked in a [`JoinSet`] rather than
//! detached, so that closing the server aborts handlers that are still inside
//! their simulated delay instead of waiting them out.

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use std::{net::SocketAddr, time::Duration};
use thiserror::Error;
use tokio::{net::TcpListener, task::JoinHandle, task::JoinSet};
use tracing::{debug, info, warn};

use crate::lifecycle::ShutdownHandle;

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),

    /// The listener was closed while the server was running.
    #[error("use of closed listener")]
    Closed,

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ServerError {
    pub fn is_closed(&self) -> bool {
        matches!(self, ServerError::Closed)
    }
}

pub struct StubServer {
    local_addr: SocketAddr,
    shutdown: ShutdownHandle,
    task: JoinHandle<Result<(), ServerError>>,
}

impl StubServer {
    /// Binds `addr` and starts accepting on a background task.
    pub async fn bind(
        addr: SocketAddr,
        app: Router,
        shutdown: ShutdownHandle,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
        info!(%local_addr, "target service listening");

        let task = tokio::spawn(serve(listener, app, shutdown.clone()));
        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting, drops the listener and force-closes every open
    /// connection. A deliberate close yields [`ServerError::Closed`].
    pub async fn close(self) -> Result<(), ServerError> {
        self.shutdown.cancel();
        self.task.await?
    }
}

async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: ShutdownHandle,
) -> Result<(), ServerError> {
    let mut connections = JoinSet::new();
    let mut backoff = ACCEPT_BACKOFF_MIN;

    let result = loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break Err(ServerError::Closed),
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    backoff = ACCEPT_BACKOFF_MIN;
                    let service = TowerToHyperService::new(app.clone());
                    connections.spawn(async move {
                        let conn = http1::Builder::new()
                            .keep_alive(true)
                            .serve_connection(TokioIo::new(stream), service);
                        if let Err(err) = conn.await {
                            if !err.is_incomplete_message() {
                                debug!(%peer, error = %err, "connection error");
                            }
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, retry_in = ?backoff, "accept failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break Err(ServerError::Closed),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(ACCEPT_BACKOFF_MAX);
                }
            },
        }
    };

    drop(listener);
    let open = connections.len();
    connections.shutdown().await;
    debug!(open, "connections closed");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{self, StubSettings};

    fn app(delay: Duration) -> Router {
        api::router(StubSettings {
            delay,
            echo: true,
            require_counter: false,
        })
    }

    async fn bind_local() -> StubServer {
        let addr = "127.0.0.1:0".parse().unwrap();
        StubServer::bind(addr, app(Duration::ZERO), ShutdownHandle::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bind_conflict_reported() {
        let first = bind_local().await;

        let err = StubServer::bind(first.local_addr(), app(Duration::ZERO), ShutdownHandle::new())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(first.close().await.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn test_close_stops_accepting() {
        let server = bind_local().await;
        let addr = server.local_addr();

        assert!(server.close().await.unwrap_err().is_closed());
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[test]
    fn test_only_closed_is_closed() {
        assert!(ServerError::Closed.is_closed());
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        assert!(!ServerError::LocalAddr(io).is_closed());
    }
}
