//! Error types and exit codes for dbgp-proxy

use std::process::ExitCode;
use thiserror::Error;

/// Main error type for dbgp-proxy operations
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Can't resolve address \"{address}\": {message}")]
    AddressResolve { address: String, message: String },

    #[error("Can't bind {name} listener on {address}: {source}")]
    Bind {
        name: String,
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Can't parse {what}.")]
    CommandParse { what: &'static str },

    #[error("Undefined command \"{command}\"")]
    UnknownCommand { command: String },

    #[error("Port \"{port}\" already in use.")]
    PortInUse { port: String },

    #[error("Idekey \"{idekey}\" isn't registered.")]
    NotRegistered { idekey: String },

    #[error("Client with idekey \"{idekey}\" isn't registered")]
    ClientNotRegistered { idekey: String },

    #[error("Can't connect to IDE at {address}: {message}")]
    Dial { address: String, message: String },

    #[error("XML error: {message}")]
    Xml { message: String },

    #[error("Install failed: {message}")]
    Install { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Convert error to an exit code:
    /// - 0: Success
    /// - 1: IO error
    /// - 2: Configuration or address error
    /// - 3: Listener bind failure
    /// - 4: Install failure
    /// - 5: Protocol errors (only reachable if one escapes a connection)
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) => ExitCode::from(1),
            Self::Config { .. } | Self::AddressResolve { .. } => ExitCode::from(2),
            Self::Bind { .. } => ExitCode::from(3),
            Self::Install { .. } => ExitCode::from(4),
            Self::CommandParse { .. }
            | Self::UnknownCommand { .. }
            | Self::PortInUse { .. }
            | Self::NotRegistered { .. }
            | Self::ClientNotRegistered { .. }
            | Self::Dial { .. }
            | Self::Xml { .. } => ExitCode::from(5),
        }
    }
}

/// Result type alias for dbgp-proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;
