//! WHIP signaling server
//!
//! Binds the configured address and serves the signaling routes.

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::error::Result;
use crate::server::controller::Controller;
use crate::server::http;

/// WHIP signaling server
pub struct WhipServer {
    controller: Controller,
}

impl WhipServer {
    /// Create a server around a controller
    pub fn new(controller: Controller) -> Self {
        Self { controller }
    }

    /// Get the controller
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.controller.config().bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.bind_addr()).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let config = self.controller.config();
        tracing::info!(addr = %listener.local_addr()?, "WHIP server listening");
        if config.tls_cert.is_some() {
            tracing::warn!("TLS certificate configured; terminate TLS in front of the bridge");
        }

        let router = http::router(self.controller.clone());
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Shutdown signal received");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;
    use crate::server::config::BridgeConfig;
    use crate::sink::SinkPool;
    use crate::transport::mock::MockFactory;

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let controller = Controller::new(
            BridgeConfig::default(),
            MockFactory::new(),
            SinkPool::disabled(),
        );
        let server = WhipServer::new(controller);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /whip/list HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("[]"));

        stop_tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
