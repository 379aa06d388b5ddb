//! dbgp-proxy: a DBGp proxy
//!
//! IDEs register an idekey and their listening port on the registry channel.
//! Debugger engines connect to the relay channel and announce an idekey in
//! their init packet; the proxy dials the matching IDE, replays the init
//! packet and relays bytes both ways until either side disconnects.
//!
//! # Example
//!
//! ```ignore
//! use dbgp_proxy::{proxy, ProxyConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ProxyConfig::default();
//! let shutdown = CancellationToken::new();
//! proxy::run(&config, shutdown).await?;
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod install;
pub mod proxy;

// Re-export commonly used types
pub use cli::{Cli, Commands};
pub use config::{LoggingConfig, PredefinedClient, ProxyConfig};
pub use error::{ProxyError, Result};
pub use proxy::{ClientRegistry, Endpoint, Proxy};
