//! Control server.
//!
//! Binding is separate from serving so callers learn the bound address
//! (port 0 picks a free port) before the server starts.

use axum::Router;
use stc_common::{Error, Result};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

/// A bound, not yet serving, control server.
pub struct ControlServer {
    listener: TcpListener,
    router: Router,
}

impl ControlServer {
    /// Binds to `host:port`.
    pub async fn bind(host: &str, port: u16, router: Router) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        info!("[Server] Binding to TCP: {}", addr);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Http(format!("failed to bind {}: {}", addr, e)))?;

        Ok(Self { listener, router })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves requests until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = self.listener.local_addr() {
            info!("[Server] ✅ Control API listening on {}", addr);
        }

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Http(format!("control server failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_bind_ephemeral_port_and_shutdown() {
        let router = Router::new().route("/ping", get(|| async { "pong" }));
        let server = ControlServer::bind("127.0.0.1", 0, router).await.unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run(async move {
            let _ = rx.await;
        }));

        let stream = tokio::net::TcpStream::connect(addr).await;
        assert!(stream.is_ok());

        tx.send(()).unwrap();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_error() {
        let first = ControlServer::bind("127.0.0.1", 0, Router::new()).await.unwrap();
        let port = first.local_addr().unwrap().port();
        assert!(ControlServer::bind("127.0.0.1", port, Router::new()).await.is_err());
    }
}
