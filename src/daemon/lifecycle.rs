//! Spawning and stopping the daemon from the CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::Settings;
use crate::daemon::client::DaemonClient;

/// Internal sentinel set on the daemon child process. Never user-set.
pub const DAEMON_ENV_SENTINEL: &str = "_MCPX_DAEMON";

/// Where the detached daemon's output goes.
pub fn daemon_log_path(settings: &Settings) -> PathBuf {
    settings.socket_path.with_file_name("daemon.log")
}

/// Re-execute ourselves as a detached `daemon run` child, stdout/stderr
/// redirected to the daemon log.
pub fn spawn_detached(settings: &Settings) -> Result<u32> {
    let exe = std::env::current_exe().context("cannot determine current executable")?;

    if let Some(parent) = settings.socket_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let log_path = daemon_log_path(settings);
    let log = std::fs::File::create(&log_path)
        .with_context(|| format!("cannot create {}", log_path.display()))?;
    let err_log = log.try_clone()?;

    let child = std::process::Command::new(exe)
        .args(["daemon", "run"])
        .env(DAEMON_ENV_SENTINEL, "1")
        .stdin(std::process::Stdio::null())
        .stdout(log)
        .stderr(err_log)
        .spawn()
        .context("failed to spawn daemon process")?;

    Ok(child.id())
}

/// Poll the readiness probe until the daemon answers or attempts run out.
pub async fn wait_until_ready(client: &DaemonClient, attempts: u32, interval: Duration) -> bool {
    for _ in 0..attempts {
        if client.is_running().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Poll for the socket file to disappear after a shutdown request.
pub async fn wait_until_gone(socket_path: &Path, attempts: u32, interval: Duration) -> bool {
    for _ in 0..attempts {
        if !socket_path.exists() {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    !socket_path.exists()
}
