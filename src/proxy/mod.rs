//! DBGp proxy core
//!
//! Two listeners share one client registry.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           dbgp-proxy                              │
//! │                                                                   │
//! │   IDE ── proxyinit/proxystop ──► registry listener                │
//! │                                    │ RegistryHandler              │
//! │                                    ▼                              │
//! │                      ClientRegistry (Arc<RwLock>)                 │
//! │                          idekey ──► host:port                     │
//! │                                    ▲                              │
//! │                                    │ RelayHandler (lookup)        │
//! │   debugger engine ── init ─────► relay listener ──► dial IDE      │
//! │                      <═══════ raw bytes both ways ═══════>        │
//! │                                                                   │
//! │   TaskTracker: both accept loops + every connection               │
//! │   CancellationToken: stops accept loops                           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Shutdown stops accepting immediately, then waits for every tracked
//! connection. A relay session that never closes holds shutdown open unless a
//! drain timeout is configured.

pub mod client_registry;
pub mod listener;
pub mod protocol;
pub mod registry_handler;
pub mod relay;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};

pub use client_registry::{ClientRegistry, Endpoint};
pub use listener::{ConnectionHandler, Listener, ListenerHandle};
pub use protocol::{InitPacket, RegistryReply, RoutingCommand, CMD_INIT, CMD_STOP};
pub use registry_handler::RegistryHandler;
pub use relay::{pipe, ClosedBy, RelayHandler, RelayOutcome};

/// A running proxy: both listeners bound and accepting
pub struct Proxy {
    clients: Arc<ClientRegistry>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    registry: ListenerHandle,
    relay: ListenerHandle,
    drain_timeout: Option<Duration>,
}

impl Proxy {
    /// Resolve and bind both listen addresses, load predefined clients and
    /// start accepting. Any failure here is fatal for the process.
    pub async fn start(config: &ProxyConfig, shutdown: CancellationToken) -> Result<Self> {
        let clients = Arc::new(ClientRegistry::new());
        clients.load_predefined(&config.predefined)?;

        let registry_addr = resolve(&config.registry_address).await?;
        let relay_addr = resolve(&config.relay_address).await?;
        let tracker = TaskTracker::new();

        let registry_handler = Arc::new(RegistryHandler::new(Arc::clone(&clients)));
        let registry =
            Listener::bind("registry", registry_addr, registry_handler, &tracker, &shutdown)
                .await?;

        let relay_handler = Arc::new(RelayHandler::new(
            Arc::clone(&clients),
            config.connect_timeout(),
        ));
        let relay = Listener::bind("proxy", relay_addr, relay_handler, &tracker, &shutdown).await?;

        let registry = registry.start()?;
        let relay = relay.start()?;
        tracing::info!("dbgp proxy started");

        Ok(Self {
            clients,
            tracker,
            shutdown,
            registry,
            relay,
            drain_timeout: config.drain_timeout(),
        })
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    pub fn registry_addr(&self) -> SocketAddr {
        self.registry.local_addr()
    }

    pub fn relay_addr(&self) -> SocketAddr {
        self.relay.local_addr()
    }

    /// Stop both listeners without waiting
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the shutdown signal, then for in-flight connections to finish
    pub async fn wait(self) {
        self.shutdown.cancelled().await;
        self.relay.stop();
        self.registry.stop();
        self.tracker.close();

        let open = self.tracker.len();
        if open > 0 {
            tracing::info!("Waiting for {} open tasks", open);
        }

        match self.drain_timeout {
            None => self.tracker.wait().await,
            Some(limit) => {
                if tokio::time::timeout(limit, self.tracker.wait()).await.is_err() {
                    tracing::warn!(
                        "Abandoning {} sessions still open after {:?}",
                        self.tracker.len(),
                        limit
                    );
                }
            }
        }
        tracing::info!("dbgp proxy stopped");
    }
}

/// Run the proxy until `shutdown` is cancelled and all sessions drain
pub async fn run(config: &ProxyConfig, shutdown: CancellationToken) -> Result<()> {
    let proxy = Proxy::start(config, shutdown).await?;
    proxy.wait().await;
    Ok(())
}

/// Resolve a `host:port` listen address to its first socket address
pub async fn resolve(address: &str) -> Result<SocketAddr> {
    let mut addrs = tokio::net::lookup_host(address)
        .await
        .map_err(|e| ProxyError::AddressResolve {
            address: address.to_string(),
            message: e.to_string(),
        })?;
    addrs.next().ok_or_else(|| ProxyError::AddressResolve {
        address: address.to_string(),
        message: "no addresses found".to_string(),
    })
}
