//! Protocol servers backing mock endpoints.
//!
//! Every protocol implements [`ProtocolServer`]; the manager only ever talks to
//! boxed trait objects produced by [`build`].

mod ftp;
mod http;
pub mod network;
mod sftp;
mod tcp;
pub mod tls;

pub use ftp::{parse_passive_range, FtpServer, DEFAULT_PASSIVE_PORTS};
pub use http::{HttpRoute, HttpServer};
pub use sftp::{load_or_generate_host_key, SftpServer};
pub use tcp::TcpServer;

use crate::config::Settings;
use crate::endpoint::{EndpointDefinition, Protocol};
use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("TLS configuration error: {0}")]
    Tls(String),
    #[error("host key error: {0}")]
    HostKey(String),
    #[error("failed to prepare root directory {path:?}: {source}")]
    RootDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("FTP server error: {0}")]
    Ftp(String),
    #[error("shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),
    #[error("server task failed: {0}")]
    Task(String),
}

/// Lifecycle contract shared by all protocol servers.
///
/// `start` returns once the listening socket is bound, so bind conflicts are
/// reported to the caller. `stop` releases the port before returning.
#[async_trait]
pub trait ProtocolServer: Send + Sync {
    async fn start(&mut self) -> Result<(), ServerError>;
    async fn stop(&mut self) -> Result<(), ServerError>;
    fn is_running(&self) -> bool;
}

/// Build the server matching the definition's protocol. Nothing is bound until `start`.
pub fn build(definition: &EndpointDefinition, settings: &Settings) -> Box<dyn ProtocolServer> {
    match definition.protocol {
        Protocol::Http | Protocol::Https => Box::new(HttpServer::new(definition, settings)),
        Protocol::Tcp => Box::new(TcpServer::new(definition, settings)),
        Protocol::Ftp => Box::new(FtpServer::new(definition, settings)),
        Protocol::Sftp => Box::new(SftpServer::new(definition, settings)),
    }
}

// ============================================================================
// Accept Loop
// ============================================================================

/// Pause before accepting again after a failed accept (EMFILE and friends).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Returns false when the loop was shut down while waiting.
async fn pause_after_accept_error(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
    }
}

/// A spawned accept loop plus the connection tasks it started.
///
/// Connection handlers receive the loop's shutdown token so they can wind down
/// when the endpoint stops.
pub(crate) struct AcceptLoop {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
    connections: TaskTracker,
}

impl AcceptLoop {
    pub(crate) fn spawn<F, Fut>(
        listener: TcpListener,
        protocol: Protocol,
        port: u16,
        mut on_accept: F,
    ) -> Self
    where
        F: FnMut(TcpStream, SocketAddr, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = CancellationToken::new();
        let connections = TaskTracker::new();

        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            let connections = connections.clone();
            async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => {
                            info!("{} endpoint on port {} shutting down", protocol, port);
                            break;
                        }
                        result = listener.accept() => {
                            match result {
                                Ok((stream, peer)) => {
                                    debug!("Accepted {} connection from {} on port {}", protocol, peer, port);
                                    connections.spawn(on_accept(stream, peer, shutdown.clone()));
                                }
                                Err(e) => {
                                    error!("Accept error on port {}: {}", port, e);
                                    if !pause_after_accept_error(&shutdown).await {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        });

        Self {
            shutdown,
            task,
            connections,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Close the listener, then wait for every connection task to exit.
    pub(crate) async fn shutdown(self) -> Result<(), ServerError> {
        let connections = self.connections.clone();
        self.close_listener().await?;
        connections.close();
        connections.wait().await;
        Ok(())
    }

    /// Close the listener and leave running connections to finish on their own.
    pub(crate) async fn close_listener(self) -> Result<(), ServerError> {
        self.shutdown.cancel();
        self.task
            .await
            .map_err(|e| ServerError::Task(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_accept_error_backs_off() {
        let shutdown = CancellationToken::new();
        let started = Instant::now();
        assert!(pause_after_accept_error(&shutdown).await);
        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_backoff_ends_on_shutdown() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let started = Instant::now();
        assert!(!pause_after_accept_error(&shutdown).await);
        assert!(started.elapsed() < ACCEPT_ERROR_BACKOFF);
    }
}
