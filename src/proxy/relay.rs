//! Debugger data channel
//!
//! Reads the engine's init packet, routes by idekey to the registered IDE,
//! replays the init packet there and then pipes bytes both ways until either
//! side closes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::{ProxyError, Result};
use crate::proxy::client_registry::ClientRegistry;
use crate::proxy::listener::ConnectionHandler;
use crate::proxy::protocol::InitPacket;

/// Which peer ended the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedBy {
    Debugger,
    Ide,
}

impl std::fmt::Display for ClosedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClosedBy::Debugger => write!(f, "debugger"),
            ClosedBy::Ide => write!(f, "IDE"),
        }
    }
}

/// How a relay ended: the direction that finished first and what it carried
#[derive(Debug)]
pub struct RelayOutcome {
    pub closed_by: ClosedBy,
    pub result: std::io::Result<u64>,
}

/// Routes debugger engine connections to registered IDEs
pub struct RelayHandler {
    clients: Arc<ClientRegistry>,
    connect_timeout: Duration,
}

impl RelayHandler {
    pub fn new(clients: Arc<ClientRegistry>, connect_timeout: Duration) -> Self {
        Self {
            clients,
            connect_timeout,
        }
    }

    async fn dial(&self, address: &str) -> Result<TcpStream> {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(ProxyError::Dial {
                address: address.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(ProxyError::Dial {
                address: address.to_string(),
                message: format!("timed out after {:?}", self.connect_timeout),
            }),
        }
    }
}

#[async_trait]
impl ConnectionHandler for RelayHandler {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let (debugger_read, mut debugger_write) = stream.into_split();
        // Bytes buffered past the init packet stay in this reader and are
        // relayed with the rest of the stream.
        let mut debugger_read = BufReader::new(debugger_read);

        let packet = InitPacket::read(&mut debugger_read).await?;
        let idekey = packet.idekey();
        tracing::info!("Debugger {} announced idekey \"{}\"", peer, idekey);

        let endpoint = self
            .clients
            .find(&idekey)
            .ok_or_else(|| ProxyError::ClientNotRegistered {
                idekey: idekey.clone(),
            })?;
        let address = endpoint.address();

        tracing::info!("Send init packet to {}", address);
        let ide = self.dial(&address).await?;
        tracing::debug!("IDE connected at {}", address);

        let (mut ide_read, mut ide_write) = ide.into_split();
        let init = packet.raw();
        ide_write.write_all(&init).await?;
        tracing::debug!("Init packet forwarded ({} bytes)", init.len());

        let outcome = pipe(
            &mut debugger_read,
            &mut debugger_write,
            &mut ide_read,
            &mut ide_write,
        )
        .await;

        match outcome.result {
            Ok(bytes) => tracing::info!(
                "Stop piping \"{}\": {} connection closed after {} bytes",
                idekey,
                outcome.closed_by,
                bytes
            ),
            Err(e) => tracing::info!(
                "Stop piping \"{}\": {} connection failed: {}",
                idekey,
                outcome.closed_by,
                e
            ),
        }
        Ok(())
    }
}

/// Copy debugger -> IDE and IDE -> debugger concurrently.
///
/// Returns as soon as either direction reaches end of stream or fails; the
/// other copy is dropped mid-flight and nothing more is forwarded.
pub async fn pipe<DR, DW, IR, IW>(
    debugger_read: &mut DR,
    debugger_write: &mut DW,
    ide_read: &mut IR,
    ide_write: &mut IW,
) -> RelayOutcome
where
    DR: AsyncRead + Unpin + ?Sized,
    DW: AsyncWrite + Unpin + ?Sized,
    IR: AsyncRead + Unpin + ?Sized,
    IW: AsyncWrite + Unpin + ?Sized,
{
    tokio::select! {
        result = tokio::io::copy(debugger_read, ide_write) => RelayOutcome {
            closed_by: ClosedBy::Debugger,
            result,
        },
        result = tokio::io::copy(ide_read, debugger_write) => RelayOutcome {
            closed_by: ClosedBy::Ide,
            result,
        },
    }
}
