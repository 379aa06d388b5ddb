//! Registry channel: proxyinit / proxystop against a running proxy

use crate::common::*;
use dbgp_proxy::proxy::{CMD_INIT, CMD_STOP};
use dbgp_proxy::Endpoint;

#[tokio::test]
async fn test_proxyinit_registers_observed_host() {
    let proxy = TestProxy::start().await;

    let reply = proxy.command("proxyinit -k ABC -p 9050").await.unwrap();
    assert!(reply.is_success());
    assert_eq!(reply.command, CMD_INIT);
    assert_eq!(reply.idekey, "ABC");

    assert_eq!(
        proxy.proxy.clients().find("ABC"),
        Some(Endpoint::new("127.0.0.1", "9050", "ABC"))
    );
}

#[tokio::test]
async fn test_second_idekey_on_same_port_is_refused() {
    let proxy = TestProxy::start().await;
    proxy.command("proxyinit -k ABC -p 9050").await.unwrap();

    let reply = proxy.command("proxyinit -k XYZ -p 9050").await.unwrap();
    assert!(!reply.is_success());
    assert_eq!(reply.idekey, "XYZ");
    assert_eq!(reply.error.as_deref(), Some("Port \"9050\" already in use."));
    assert!(proxy.proxy.clients().find("XYZ").is_none());
}

#[tokio::test]
async fn test_proxystop_then_repeat() {
    let proxy = TestProxy::start().await;
    proxy.command("proxyinit -k ABC -p 9050").await.unwrap();

    let reply = proxy.command("proxystop -k ABC").await.unwrap();
    assert!(reply.is_success());
    assert_eq!(reply.command, CMD_STOP);
    assert!(proxy.proxy.clients().find("ABC").is_none());

    let reply = proxy.command("proxystop -k ABC").await.unwrap();
    assert!(!reply.is_success());
    assert_eq!(reply.error.as_deref(), Some("Idekey \"ABC\" isn't registered."));
}

#[tokio::test]
async fn test_port_is_free_again_after_proxystop() {
    let proxy = TestProxy::start().await;
    proxy.command("proxyinit -k ABC -p 9050").await.unwrap();
    proxy.command("proxystop -k ABC").await.unwrap();

    let reply = proxy.command("proxyinit -k XYZ -p 9050").await.unwrap();
    assert!(reply.is_success());
}

#[tokio::test]
async fn test_malformed_requests() {
    let proxy = TestProxy::start().await;

    let reply = proxy.command("proxyinit -p 9050").await.unwrap();
    assert!(!reply.is_success());
    assert_eq!(reply.command, CMD_INIT);
    assert_eq!(reply.error.as_deref(), Some("Can't parse idekey."));

    // Unknown commands get the connection closed without a reply
    assert!(proxy.command("proxyfoo -k ABC").await.is_none());
    assert!(proxy.proxy.clients().is_empty());

    // So do requests without a usable command name
    assert!(proxy.command("   -k ABC -p 9050").await.is_none());
    assert!(proxy.command("pro<x -p 1").await.is_none());
    assert!(proxy.proxy.clients().is_empty());

    // The listener keeps serving after failed requests
    assert!(proxy.command("proxyinit -k ABC -p 9050").await.unwrap().is_success());
}

#[tokio::test]
async fn test_concurrent_registrations_for_one_port() {
    let proxy = TestProxy::start().await;
    let registry = proxy.registry_addr();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            tokio::spawn(async move {
                send_command(registry, &format!("proxyinit -k key{} -p 9050", i))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap().is_success() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(proxy.proxy.clients().len(), 1);
}
