//! TCP Server
//!
//! Owns the listener and the state every connection shares. A replica also
//! runs its link to the primary from here, alongside the accept loop.

use crate::commands::CommandHandler;
use crate::config::InstanceConfig;
use crate::connection::{handle_connection, ConnectionStats};
use crate::replication::{run_replica_link, ReplicationState};
use crate::storage::StorageEngine;
use crate::DEFAULT_HOST;
use anyhow::Context;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// A bound relaykv instance, ready to serve.
pub struct Server {
    listener: TcpListener,
    handler: CommandHandler,
    stats: Arc<ConnectionStats>,
}

impl Server {
    /// Binds the loopback listener on the configured port.
    pub async fn bind(config: InstanceConfig) -> anyhow::Result<Self> {
        let addr = format!("{}:{}", DEFAULT_HOST, config.port());
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        Self::from_listener(listener, config)
    }

    /// Wraps an already bound listener.
    ///
    /// The configured port is replaced by the listener's actual port, so
    /// binding to port 0 announces the right port during a replica handshake.
    pub fn from_listener(listener: TcpListener, config: InstanceConfig) -> anyhow::Result<Self> {
        let local = listener
            .local_addr()
            .context("failed to read listener address")?;
        let config = config.with_port(local.port());

        let storage = Arc::new(StorageEngine::new());
        let replication = Arc::new(ReplicationState::new(config));

        Ok(Self {
            listener,
            handler: CommandHandler::new(storage, replication),
            stats: Arc::new(ConnectionStats::new()),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        self.handler.storage()
    }

    pub fn replication(&self) -> &Arc<ReplicationState> {
        self.handler.replication()
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Serves until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let config = self.replication().config().clone();
        if let Some(primary) = config.primary_address().cloned() {
            let handler = self.handler.clone();
            let stats = Arc::clone(&self.stats);
            tokio::spawn(async move {
                if let Err(e) = run_replica_link(primary, config.port(), handler, stats).await {
                    error!(error = %format!("{:#}", e), "Replication link ended");
                }
            });
        }

        let stats = Arc::clone(&self.stats);

        tokio::select! {
            _ = accept_loop(self.listener, self.handler, Arc::clone(&stats)) => {}
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }

        info!(
            connections = stats.connections_accepted.load(Ordering::Relaxed),
            commands = stats.commands_processed.load(Ordering::Relaxed),
            bytes_read = stats.bytes_read.load(Ordering::Relaxed),
            bytes_written = stats.bytes_written.load(Ordering::Relaxed),
            "Server shutdown complete"
        );
    }

    /// Serves until Ctrl+C.
    pub async fn run_until_ctrl_c(self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C, serving until killed");
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

/// Main loop that accepts incoming connections
async fn accept_loop(listener: TcpListener, handler: CommandHandler, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = handler.clone();
                let stats = Arc::clone(&stats);

                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, stats).await;
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Role;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_from_listener_uses_actual_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = Server::from_listener(listener, InstanceConfig::primary(0)).unwrap();
        assert_eq!(server.replication().config().port(), port);
        assert_eq!(server.replication().role(), Role::Primary);
    }

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Server::from_listener(listener, InstanceConfig::primary(0)).unwrap();
        let addr = server.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async {
            let _ = stop_rx.await;
        }));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        let mut buf = [0u8; 7];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"+PONG\r\n");

        stop_tx.send(()).unwrap();
        task.await.unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }
}
