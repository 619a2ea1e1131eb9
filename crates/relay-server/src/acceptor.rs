//! TCP listener that serves the relay's router until told to stop.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use relay_core::RelayError;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::BindTarget;

/// A bound, running listener.
///
/// Stopping it closes the listening socket. Connections that were already
/// upgraded to WebSocket are owned by their sessions and keep running.
pub struct Acceptor {
    local_addr: SocketAddr,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl Acceptor {
    /// Bind `target` and start serving `router`.
    pub async fn bind(target: &BindTarget, router: Router) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(target.socket_addr())
            .await
            .map_err(RelayError::Bind)?;
        let local_addr = listener.local_addr().map_err(RelayError::Bind)?;

        let stop = CancellationToken::new();
        let signal = stop.clone().cancelled_owned();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await
            {
                error!(error = %e, "listener failed");
            }
        });

        info!(addr = %local_addr, path = %target.path, "accepting websocket connections");
        Ok(Self {
            local_addr,
            stop,
            task,
        })
    }

    /// Address actually bound (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and wait up to `timeout` for the listener to exit.
    pub async fn stop(self, timeout: Duration) {
        self.stop.cancel();
        let mut task = self.task;
        if tokio::time::timeout(timeout, &mut task).await.is_err() {
            warn!(addr = %self.local_addr, "listener did not stop in time, aborting");
            task.abort();
        }
        info!(addr = %self.local_addr, "stopped accepting connections");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    fn loopback() -> BindTarget {
        BindTarget {
            host: "127.0.0.1".into(),
            port: 0,
            path: "/".into(),
        }
    }

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let acceptor = Acceptor::bind(&loopback(), Router::new()).await.unwrap();
        assert_ne!(acceptor.local_addr().port(), 0);
        acceptor.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn stop_closes_listener() {
        let router = Router::new().route("/ping", get(|| async { "pong" }));
        let acceptor = Acceptor::bind(&loopback(), router).await.unwrap();
        let addr = acceptor.local_addr();

        let body = reqwest::get(format!("http://{addr}/ping"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "pong");

        acceptor.stop(Duration::from_secs(2)).await;
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn bind_conflict_is_bind_error() {
        let first = Acceptor::bind(&loopback(), Router::new()).await.unwrap();
        let taken = BindTarget {
            port: first.local_addr().port(),
            ..loopback()
        };
        let err = Acceptor::bind(&taken, Router::new()).await.err().unwrap();
        assert_eq!(err.kind(), "bind");
        first.stop(Duration::from_secs(1)).await;
    }
}
