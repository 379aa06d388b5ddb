//! dbgp-proxy CLI entry point

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use dbgp_proxy::cli::{InstallArgs, ProxyArgs};
use dbgp_proxy::install::{self, InstallOptions};
use dbgp_proxy::{Cli, Commands, Proxy, ProxyConfig, ProxyError};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<ProxyError>()
                .map(ProxyError::exit_code)
                .unwrap_or(ExitCode::FAILURE)
        }
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Proxy(args) => run_proxy(args, cli.verbose),
        Commands::Install(args) => run_install(args, cli.verbose),
    }
}

/// Initialize logging; `RUST_LOG` wins over the configured level
fn init_logging(level: &str, verbose: bool) {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dbgp_proxy={}", level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run_proxy(args: ProxyArgs, verbose: bool) -> anyhow::Result<()> {
    let config_path = ProxyConfig::resolve_path(args.config.as_deref());
    let config = match &config_path {
        Some(path) => ProxyConfig::load_from(path),
        None => Ok(ProxyConfig::default()),
    }
    .context("Failed to load configuration")?
    .with_overrides(args.xdebug, args.registry);
    init_logging(&config.logging.level, verbose);

    match &config_path {
        Some(path) if path.exists() => tracing::info!("Loaded config from {}", path.display()),
        Some(path) => tracing::debug!("No config at {}, using defaults", path.display()),
        None => tracing::debug!("No config directory, using defaults"),
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async {
        let shutdown = CancellationToken::new();
        let proxy = Proxy::start(&config, shutdown.clone()).await?;
        tracing::info!(
            "Registry on {}, debugger connections on {}",
            proxy.registry_addr(),
            proxy.relay_addr()
        );

        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        });

        proxy.wait().await;
        Ok::<(), anyhow::Error>(())
    })
}

fn run_install(args: InstallArgs, verbose: bool) -> anyhow::Result<()> {
    init_logging("info", verbose);
    let options = InstallOptions {
        user: args.user,
        group: args.group,
        binary: install::current_binary().context("Can't locate the dbgp-proxy binary")?,
        output: args.output,
    };
    install::install(&options)?;
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Can't listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Can't listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
