//! Registry control channel
//!
//! One request per connection: read a null-terminated command, apply it to
//! the client registry, write back an XML reply, close.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::{ProxyError, Result};
use crate::proxy::client_registry::{ClientRegistry, Endpoint};
use crate::proxy::listener::ConnectionHandler;
use crate::proxy::protocol::{read_segment, CommandError, RegistryReply, RoutingCommand};

/// Serves `proxyinit` / `proxystop` requests from IDEs
pub struct RegistryHandler {
    clients: Arc<ClientRegistry>,
}

impl RegistryHandler {
    pub fn new(clients: Arc<ClientRegistry>) -> Self {
        Self { clients }
    }

    /// Apply one command line received from `peer`.
    ///
    /// `Ok` is a reply to send back, including expected refusals such as a
    /// port conflict. `Err` is a malformed request; it may still carry a
    /// best-effort reply.
    pub fn process(
        &self,
        line: &str,
        peer: SocketAddr,
    ) -> std::result::Result<RegistryReply, CommandError> {
        let command = RoutingCommand::parse(line)?;
        let name = command.name();

        let reply = match command {
            RoutingCommand::Init { idekey, port } => {
                let host = peer.ip().to_canonical().to_string();
                let endpoint = Endpoint::new(host.clone(), port.clone(), idekey.clone());
                match self.clients.register(endpoint) {
                    Ok(()) => {
                        tracing::info!(
                            "Add client with host \"{}\", port \"{}\" and idekey \"{}\"",
                            host,
                            port,
                            idekey
                        );
                        RegistryReply::success(name, &idekey)
                    }
                    Err(e) => {
                        tracing::warn!("Refused client \"{}\": {}", idekey, e);
                        RegistryReply::failure(name, &idekey, e.to_string())
                    }
                }
            }
            RoutingCommand::Stop { idekey } => match self.clients.remove(&idekey) {
                Some(_) => {
                    tracing::info!("Delete client with idekey \"{}\"", idekey);
                    RegistryReply::success(name, &idekey)
                }
                None => {
                    tracing::info!("Attempt to delete unknown idekey \"{}\"", idekey);
                    let e = ProxyError::NotRegistered {
                        idekey: idekey.clone(),
                    };
                    RegistryReply::failure(name, &idekey, e.to_string())
                }
            },
        };
        Ok(reply)
    }
}

#[async_trait]
impl ConnectionHandler for RegistryHandler {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let mut stream = BufReader::new(stream);
        let segment = read_segment(&mut stream).await?;
        let line = String::from_utf8_lossy(segment.payload()).into_owned();
        tracing::debug!("Registry request from {}: {:?}", peer, line);

        let (reply, outcome) = match self.process(&line, peer) {
            Ok(reply) => (Some(reply), Ok(())),
            Err(e) => (e.reply(), Err(e.error)),
        };

        if let Some(reply) = reply {
            let xml = reply.to_xml()?;
            let stream = stream.get_mut();
            stream.write_all(&xml).await?;
            stream.shutdown().await?;
        }
        outcome
    }
}
