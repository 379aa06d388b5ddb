//! Shutdown: listeners stop, open sessions are waited for

use std::time::Duration;

use tokio::net::TcpStream;

use crate::common::*;

#[tokio::test]
async fn test_idle_proxy_stops_promptly() {
    let proxy = TestProxy::start().await;
    let registry = proxy.registry_addr();

    proxy.shutdown.cancel();
    tokio::time::timeout(STEP, proxy.proxy.wait())
        .await
        .expect("Idle proxy did not stop");

    assert!(TcpStream::connect(registry).await.is_err());
}

#[tokio::test]
async fn test_shutdown_waits_for_open_relay() {
    let proxy = TestProxy::start().await;
    let ide = FakeIde::bind().await;
    proxy
        .command(&format!("proxyinit -k ABC -p {}", ide.port()))
        .await
        .unwrap();

    let init = init_packet("ABC");
    let debugger = proxy.debugger("ABC").await;
    let mut session = ide.accept().await;
    read_n(&mut session, init.len()).await;

    proxy.proxy.stop();
    let mut waiting = tokio::spawn(proxy.proxy.wait());
    assert!(
        tokio::time::timeout(Duration::from_millis(300), &mut waiting)
            .await
            .is_err(),
        "Shutdown finished while a session was open"
    );

    drop(debugger);
    tokio::time::timeout(STEP, waiting)
        .await
        .expect("Shutdown did not finish after the session closed")
        .unwrap();
}

#[tokio::test]
async fn test_drain_timeout_abandons_open_relay() {
    let ide = FakeIde::bind().await;
    let mut config = loopback_config();
    config.drain_timeout_secs = Some(1);
    config.predefined.push(ide.predefined("ABC"));
    let proxy = TestProxy::with_config(config).await;

    let init = init_packet("ABC");
    let _debugger = proxy.debugger("ABC").await;
    let mut session = ide.accept().await;
    read_n(&mut session, init.len()).await;

    proxy.shutdown.cancel();
    tokio::time::timeout(STEP, proxy.proxy.wait())
        .await
        .expect("Drain timeout was not honored");
}
