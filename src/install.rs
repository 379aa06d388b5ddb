//! systemd service installation
//!
//! Renders a unit file that runs `<binary> proxy` as the given user and group.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ProxyError, Result};

/// Inputs for the service unit
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub user: String,
    pub group: String,
    pub binary: PathBuf,
    pub output: PathBuf,
}

/// Render the unit file contents
pub fn render_unit(options: &InstallOptions) -> String {
    format!(
        "[Unit]
Description=Dbgp proxy
After=network.target

[Service]
Type=simple
User={user}
Group={group}
ExecStart={binary} proxy
Restart=always

[Install]
WantedBy=multi-user.target
",
        user = options.user,
        group = options.group,
        binary = options.binary.display(),
    )
}

/// Absolute path of the running executable
pub fn current_binary() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    Ok(fs::canonicalize(&exe).unwrap_or(exe))
}

/// Write the unit file to `options.output`
pub fn install(options: &InstallOptions) -> Result<()> {
    write_unit(&options.output, &render_unit(options))?;
    tracing::info!("Wrote service unit to {}", options.output.display());
    Ok(())
}

fn write_unit(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| ProxyError::Install {
        message: format!("can't write {}: {}", path.display(), e),
    })
}
