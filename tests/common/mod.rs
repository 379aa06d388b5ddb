//! Common test utilities for dbgp-proxy integration tests
//!
//! This module provides:
//! - `TestProxy` for running a proxy on loopback ephemeral ports
//! - `FakeIde` for an IDE listening for routed debugger sessions
//! - Helpers for speaking the registry and debugger wire formats

#![allow(dead_code)]

pub mod test_proxy;

pub use test_proxy::*;
