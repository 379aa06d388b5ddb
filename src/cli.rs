//! CLI argument definitions using clap with subcommand architecture

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// DBGp proxy: routes debugger engines to registered IDEs by idekey
#[derive(Parser, Debug)]
#[command(name = "dbgp-proxy")]
#[command(about = "DBGp proxy for routing debugger engine connections to IDEs")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Show verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

// ============================================
// Main Commands Enum
// ============================================

/// Available subcommands for dbgp-proxy
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the dbgp proxy
    Proxy(ProxyArgs),

    /// Install the dbgp proxy as a systemd service
    Install(InstallArgs),
}

// ============================================
// Proxy Subcommand
// ============================================

/// Arguments for the proxy command
#[derive(Args, Debug)]
pub struct ProxyArgs {
    /// ip:port for xdebug connections
    #[arg(long = "xdebug", value_name = "ADDR", env = "DBGP_XDEBUG_ADDRESS")]
    pub xdebug: Option<String>,

    /// ip:port for idekey registry connections
    #[arg(long, value_name = "ADDR", env = "DBGP_REGISTRY_ADDRESS")]
    pub registry: Option<String>,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, value_name = "PATH", env = "DBGP_CONFIG")]
    pub config: Option<PathBuf>,
}

// ============================================
// Install Subcommand
// ============================================

/// Arguments for the install command
#[derive(Args, Debug)]
pub struct InstallArgs {
    /// User for proxy process
    #[arg(long, default_value = "www-data")]
    pub user: String,

    /// Group for proxy process
    #[arg(long, default_value = "www-data")]
    pub group: String,

    /// Path to service unit file
    #[arg(long = "out", value_name = "PATH", default_value = "/etc/systemd/system/dbgp.service")]
    pub output: PathBuf,
}
