//! IDE client registry
//!
//! Maps an idekey to the endpoint of the IDE that registered it. One instance
//! is shared by the registry listener (read-write) and the relay listener
//! (lookups only). Every operation takes the single lock for its own duration;
//! nothing is held across I/O.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::config::PredefinedClient;
use crate::error::{ProxyError, Result};

/// A registered IDE listening endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: String,
    pub idekey: String,
}

impl Endpoint {
    pub fn new(
        host: impl Into<String>,
        port: impl Into<String>,
        idekey: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            idekey: idekey.into(),
        }
    }

    /// Parse a `host:port` address, as found in the predefined client list
    pub fn from_address(idekey: &str, address: &str) -> Result<Self> {
        let (host, port) = split_host_port(address).ok_or_else(|| ProxyError::Config {
            message: format!("invalid address \"{}\" for idekey \"{}\"", address, idekey),
        })?;
        Ok(Self::new(host, port, idekey))
    }

    /// Dialable `host:port`, with IPv6 hosts bracketed
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Split `host:port` or `[v6host]:port`
fn split_host_port(address: &str) -> Option<(&str, &str)> {
    let (host, port) = address.rsplit_once(':')?;
    let host = match host.strip_prefix('[') {
        Some(inner) => inner.strip_suffix(']')?,
        None if host.contains(':') => return None,
        None => host,
    };
    if port.is_empty() || port.parse::<u16>().is_err() {
        return None;
    }
    Some((host, port))
}

/// Concurrency-safe idekey -> endpoint store
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, Endpoint>>,
}

impl ClientRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace the endpoint for its idekey
    pub fn add(&self, endpoint: Endpoint) {
        let mut clients = self.clients.write();
        clients.insert(endpoint.idekey.clone(), endpoint);
    }

    /// Register an endpoint unless another idekey already holds its port.
    ///
    /// The port check and the insert happen under one write lock, so two
    /// racing registrations for the same port cannot both succeed.
    pub fn register(&self, endpoint: Endpoint) -> Result<()> {
        let mut clients = self.clients.write();
        let taken = clients
            .values()
            .any(|c| c.port == endpoint.port && c.idekey != endpoint.idekey);
        if taken {
            return Err(ProxyError::PortInUse {
                port: endpoint.port,
            });
        }
        clients.insert(endpoint.idekey.clone(), endpoint);
        Ok(())
    }

    /// Remove the endpoint for an idekey, returning it if it was present
    pub fn remove(&self, idekey: &str) -> Option<Endpoint> {
        self.clients.write().remove(idekey)
    }

    pub fn find(&self, idekey: &str) -> Option<Endpoint> {
        self.clients.read().get(idekey).cloned()
    }

    /// Whether any registered endpoint listens on `port`
    pub fn has_port(&self, port: &str) -> bool {
        self.clients.read().values().any(|c| c.port == port)
    }

    /// Load the predefined client list from configuration
    pub fn load_predefined(&self, items: &[PredefinedClient]) -> Result<()> {
        for item in items {
            let endpoint = Endpoint::from_address(&item.idekey, &item.address)?;
            tracing::info!(
                "Predefined client \"{}\" -> {}",
                endpoint.idekey,
                endpoint.address()
            );
            self.add(endpoint);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Copy of all current registrations, sorted by idekey
    pub fn snapshot(&self) -> Vec<Endpoint> {
        let mut all: Vec<Endpoint> = self.clients.read().values().cloned().collect();
        all.sort_by(|a, b| a.idekey.cmp(&b.idekey));
        all
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
