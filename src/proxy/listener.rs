//! Shared TCP accept loop
//!
//! A `Listener` owns a bound socket and a handler. Each accepted connection is
//! spawned on the shared `TaskTracker`, as is the accept loop itself, so the
//! owner can wait for every in-flight connection after stopping all
//! listeners.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{ProxyError, Result};

/// Pause after a failed accept (e.g. file descriptor exhaustion)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Something that can serve one accepted connection
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<()>;
}

/// A bound, not yet accepting, listener
pub struct Listener<H> {
    name: String,
    socket: TcpListener,
    handler: Arc<H>,
    tracker: TaskTracker,
    stop: CancellationToken,
}

/// Control side of a running listener
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    name: String,
    local_addr: SocketAddr,
    stop: CancellationToken,
}

impl ListenerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Ask the accept loop to exit. Connections already accepted keep running.
    pub fn stop(&self) {
        self.stop.cancel();
    }
}

impl<H: ConnectionHandler> Listener<H> {
    /// Bind `address`. The listener stops when `shutdown` (or its own handle)
    /// is cancelled.
    pub async fn bind(
        name: &str,
        address: SocketAddr,
        handler: Arc<H>,
        tracker: &TaskTracker,
        shutdown: &CancellationToken,
    ) -> Result<Self> {
        let socket = TcpListener::bind(address)
            .await
            .map_err(|source| ProxyError::Bind {
                name: name.to_string(),
                address: address.to_string(),
                source,
            })?;
        Ok(Self {
            name: name.to_string(),
            socket,
            handler,
            tracker: tracker.clone(),
            stop: shutdown.child_token(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Spawn the accept loop on the tracker
    pub fn start(self) -> Result<ListenerHandle> {
        let handle = ListenerHandle {
            name: self.name.clone(),
            local_addr: self.local_addr()?,
            stop: self.stop.clone(),
        };
        let tracker = self.tracker.clone();
        tracker.spawn(self.accept_loop());
        Ok(handle)
    }

    async fn accept_loop(self) {
        let local_addr = self
            .socket
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        tracing::info!("Start {} server on {}", self.name, local_addr);

        loop {
            let accepted = tokio::select! {
                _ = self.stop.cancelled() => break,
                accepted = self.socket.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let name = self.name.clone();
                    let handler = Arc::clone(&self.handler);
                    self.tracker.spawn(serve(name, handler, stream, peer));
                }
                Err(e) => {
                    tracing::warn!("{} server failed to accept connection: {}", self.name, e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        tracing::info!("Shutdown {} server", self.name);
    }
}

async fn serve<H: ConnectionHandler>(
    name: String,
    handler: Arc<H>,
    stream: TcpStream,
    peer: SocketAddr,
) {
    tracing::info!("Start new connection on {} from {}", name, peer);
    if let Err(e) = handler.handle(stream, peer).await {
        tracing::warn!("Connection on {} from {} failed: {}", name, peer, e);
    }
    tracing::info!("Close connection on {} from {}", name, peer);
}
