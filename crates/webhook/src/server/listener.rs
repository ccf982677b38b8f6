//! TLS accept loop and graceful shutdown.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpBuilder;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::middleware::HANDSHAKE_TIMEOUT;
use super::tls::build_server_config;
use crate::certs::CertificateStore;

/// Pause after a failed `accept`, typically file descriptor exhaustion.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// HTTPS server bound to a socket, not yet accepting connections.
pub struct Server {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    router: Router,
    shutdown: CancellationToken,
    connections: TaskTracker,
}

impl Server {
    /// Bind `addr` and prepare a TLS acceptor that resolves certificates from
    /// `store` on every handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound or the TLS
    /// configuration cannot be built.
    pub async fn bind(addr: SocketAddr, store: &CertificateStore, router: Router) -> Result<Self> {
        let config = build_server_config(store).context("failed to build TLS configuration")?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;

        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(config),
            router,
            shutdown: CancellationToken::new(),
            connections: TaskTracker::new(),
        })
    }

    /// Address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle used to stop this server once [`serve`](Self::serve) is running.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: self.shutdown.clone(),
            connections: self.connections.clone(),
        }
    }

    /// Accept connections until [`ShutdownHandle::shutdown`] is called.
    ///
    /// Accept errors and failed handshakes are logged and never end the loop.
    pub async fn serve(self) {
        let addr = self.listener.local_addr().ok();
        info!(addr = ?addr, "listening");

        loop {
            let (stream, peer) = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept TCP connection");
                        time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                },
            };

            self.connections.spawn(serve_connection(
                stream,
                peer,
                self.acceptor.clone(),
                self.router.clone(),
                self.shutdown.clone(),
            ));
        }

        info!("stopped accepting connections");
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    router: Router,
    shutdown: CancellationToken,
) {
    // A handshake still pending at shutdown has no request to drain.
    let handshake = time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream));
    let tls_stream = tokio::select! {
        _ = shutdown.cancelled() => {
            debug!(%peer, "dropping connection mid-handshake on shutdown");
            return;
        }
        result = handshake => match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!(%peer, error = %e, "TLS handshake failed");
                return;
            }
            Err(_) => {
                debug!(%peer, "TLS handshake timed out");
                return;
            }
        },
    };

    let io = TokioIo::new(tls_stream);
    let service = TowerToHyperService::new(router.into_service());
    let builder = HttpBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection(io, service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.cancelled() => {
            // Finish in-flight requests, refuse new ones, close idle keep-alives.
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(e) = result {
        warn!(%peer, error = %e, "error serving connection");
    }
}

/// Stops a running [`Server`] and drains its connections.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    shutdown: CancellationToken,
    connections: TaskTracker,
}

impl ShutdownHandle {
    /// Stop accepting, ask open connections to finish, and wait up to
    /// `deadline` for them.
    ///
    /// Returns `true` if every connection closed before the deadline.
    /// Connections still open afterwards keep running until the runtime
    /// shuts down.
    pub async fn shutdown(&self, deadline: Duration) -> bool {
        self.shutdown.cancel();
        self.connections.close();

        match time::timeout(deadline, self.connections.wait()).await {
            Ok(()) => {
                info!("all connections drained");
                true
            }
            Err(_) => {
                warn!(
                    open_connections = self.connections.len(),
                    "shutdown deadline elapsed with connections still open"
                );
                false
            }
        }
    }

    /// Returns `true` once shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
