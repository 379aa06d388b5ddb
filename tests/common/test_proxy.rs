//! Loopback proxy fixture and wire helpers

use std::net::SocketAddr;
use std::time::Duration;

use dbgp_proxy::proxy::RegistryReply;
use dbgp_proxy::{PredefinedClient, Proxy, ProxyConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Upper bound for anything a test waits on
pub const STEP: Duration = Duration::from_secs(5);

/// Configuration with both listeners on ephemeral loopback ports
pub fn loopback_config() -> ProxyConfig {
    ProxyConfig::default().with_overrides(
        Some("127.0.0.1:0".to_string()),
        Some("127.0.0.1:0".to_string()),
    )
}

/// A proxy running on loopback
pub struct TestProxy {
    pub proxy: Proxy,
    pub shutdown: CancellationToken,
}

impl TestProxy {
    pub async fn start() -> Self {
        Self::with_config(loopback_config()).await
    }

    pub async fn with_config(config: ProxyConfig) -> Self {
        let shutdown = CancellationToken::new();
        let proxy = Proxy::start(&config, shutdown.clone())
            .await
            .expect("Failed to start proxy");
        Self { proxy, shutdown }
    }

    pub fn registry_addr(&self) -> SocketAddr {
        self.proxy.registry_addr()
    }

    pub fn relay_addr(&self) -> SocketAddr {
        self.proxy.relay_addr()
    }

    /// Send one registry command and parse the reply, if any
    pub async fn command(&self, command: &str) -> Option<RegistryReply> {
        send_command(self.registry_addr(), command).await
    }

    /// Connect as a debugger engine and send an init packet for `idekey`
    pub async fn debugger(&self, idekey: &str) -> TcpStream {
        let mut stream = TcpStream::connect(self.relay_addr())
            .await
            .expect("Failed to connect to relay");
        stream
            .write_all(&init_packet(idekey))
            .await
            .expect("Failed to send init packet");
        stream
    }
}

/// An IDE waiting for debugger sessions
pub struct FakeIde {
    pub listener: TcpListener,
}

impl FakeIde {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake IDE");
        Self { listener }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    pub fn predefined(&self, idekey: &str) -> PredefinedClient {
        PredefinedClient {
            idekey: idekey.to_string(),
            address: format!("127.0.0.1:{}", self.port()),
        }
    }

    pub async fn accept(&self) -> TcpStream {
        let (stream, _) = tokio::time::timeout(STEP, self.listener.accept())
            .await
            .expect("No session routed to IDE")
            .expect("IDE accept failed");
        stream
    }

    /// Whether a connection arrives within `wait`
    pub async fn receives_connection_within(&self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.listener.accept())
            .await
            .is_ok()
    }
}

/// Send `command\0` to a registry listener and read the reply until close
pub async fn send_command(registry: SocketAddr, command: &str) -> Option<RegistryReply> {
    let mut stream = TcpStream::connect(registry)
        .await
        .expect("Failed to connect to registry");
    let mut request = command.as_bytes().to_vec();
    request.push(0);
    stream.write_all(&request).await.unwrap();

    let mut reply = Vec::new();
    tokio::time::timeout(STEP, stream.read_to_end(&mut reply))
        .await
        .expect("Registry did not close the connection")
        .unwrap();
    if reply.is_empty() {
        return None;
    }
    let xml = String::from_utf8(reply).expect("Reply is not UTF-8");
    Some(RegistryReply::from_xml(&xml).expect("Reply is not valid XML"))
}

/// An Xdebug-style init packet: `<length>\0<xml>\0`
pub fn init_packet(idekey: &str) -> Vec<u8> {
    let xml = format!(
        concat!(
            r#"<?xml version="1.0" encoding="iso-8859-1"?>"#,
            r#"<init xmlns="urn:debugger_protocol_v1" fileuri="file:///var/www/index.php" "#,
            r#"language="PHP" protocol_version="1.0" appid="4242" idekey="{}">"#,
            r#"<engine version="3.3.1"><![CDATA[Xdebug]]></engine></init>"#
        ),
        idekey
    );
    let mut packet = xml.len().to_string().into_bytes();
    packet.push(0);
    packet.extend_from_slice(xml.as_bytes());
    packet.push(0);
    packet
}

/// Read exactly `len` bytes
pub async fn read_n(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(STEP, stream.read_exact(&mut buf))
        .await
        .expect("Timed out reading")
        .expect("Read failed");
    buf
}

/// Read until the peer closes; returns what arrived
pub async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
    let mut rest = Vec::new();
    tokio::time::timeout(STEP, stream.read_to_end(&mut rest))
        .await
        .expect("Peer did not close")
        .expect("Read failed");
    rest
}
