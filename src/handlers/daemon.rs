//! Daemon management commands: start, stop, status, connect, disconnect,
//! and the internal foreground `run`.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{LoadedConfig, Settings};
use crate::daemon::client::DaemonClient;
use crate::daemon::lifecycle::{daemon_log_path, spawn_detached, wait_until_gone, wait_until_ready};
use crate::daemon::pool::ConnectionPool;
use crate::daemon::service::DaemonService;
use crate::error::McpxError;
use crate::mcp::factory::McpSessionFactory;

/// Start polling cadence while waiting for the spawned daemon to answer.
const START_POLL_INTERVAL: Duration = Duration::from_millis(100);
const START_POLL_ATTEMPTS: u32 = 20;

/// Stop polling: up to 10 x 50 ms for the socket to disappear.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);
const STOP_POLL_ATTEMPTS: u32 = 10;

pub async fn run_daemon_start(settings: &Settings) -> Result<(), McpxError> {
    let client = DaemonClient::new(settings.socket_path.clone());
    if client.is_running().await {
        println!("Daemon is already running.");
        println!("Socket: {}", settings.socket_path.display());
        return Ok(());
    }

    let pid = spawn_detached(settings)
        .map_err(|e| McpxError::Network(format!("failed to start daemon: {e:#}")))?;

    if wait_until_ready(&client, START_POLL_ATTEMPTS, START_POLL_INTERVAL).await {
        println!("Daemon started (pid {pid}).");
        println!("Socket: {}", settings.socket_path.display());
        Ok(())
    } else {
        Err(McpxError::Network(format!(
            "daemon did not become ready; check {}",
            daemon_log_path(settings).display()
        )))
    }
}

pub async fn run_daemon_stop(settings: &Settings, force: bool) -> Result<(), McpxError> {
    let client = DaemonClient::new(settings.socket_path.clone());

    if !client.is_running().await {
        if settings.socket_path.exists() {
            let _ = std::fs::remove_file(&settings.socket_path);
            println!("Removed stale socket.");
        }
        println!("Daemon is not running.");
        return Ok(());
    }

    // Refuse to tear down sessions other agents may be using.
    let servers = client.list().await.map_err(McpxError::network)?;
    if servers.len() > 1 && !force {
        return Err(McpxError::Client(format!(
            "daemon holds {} active servers ({}); use --force to stop anyway",
            servers.len(),
            servers.join(", ")
        )));
    }

    let released = client.shutdown().await.map_err(McpxError::network)?;
    if !released.is_empty() {
        println!("Released: {}", released.join(", "));
    }

    if wait_until_gone(&settings.socket_path, STOP_POLL_ATTEMPTS, STOP_POLL_INTERVAL).await {
        println!("Daemon stopped.");
        Ok(())
    } else {
        Err(McpxError::Network(
            "daemon did not exit; socket still present".to_string(),
        ))
    }
}

pub async fn run_daemon_status(settings: &Settings, json: bool) -> Result<(), McpxError> {
    let client = DaemonClient::new(settings.socket_path.clone());
    if !client.is_running().await {
        println!("Daemon is not running.");
        return Ok(());
    }

    let detailed = client.list_detailed().await.map_err(McpxError::network)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&detailed)
                .map_err(|e| McpxError::Client(format!("cannot serialize status: {e}")))?
        );
        return Ok(());
    }

    println!("Daemon running on {}", settings.socket_path.display());
    if detailed.is_empty() {
        println!("No servers connected.");
        return Ok(());
    }
    println!("{} connected:", detailed.len());
    for info in detailed {
        println!(
            "  {} [{}] idle {}s (config: {})",
            info.name, info.transport, info.idle_seconds, info.config_source
        );
    }
    Ok(())
}

/// Foreground daemon loop; `daemon start` spawns this as a detached
/// child carrying the `_MCPX_DAEMON` sentinel.
pub async fn run_daemon_run(settings: &Settings) -> Result<(), McpxError> {
    let factory = Arc::new(McpSessionFactory::new(settings));
    let pool = ConnectionPool::new(factory, settings.idle_timeout);
    let service = DaemonService::new(pool, settings.socket_path.clone());
    service
        .run()
        .await
        .map_err(|e| McpxError::Network(format!("{e:#}")))
}

pub async fn run_connect(
    loaded: &LoadedConfig,
    settings: &Settings,
    server: &str,
) -> Result<(), McpxError> {
    let config = loaded.server(server)?;

    let client = DaemonClient::new(settings.socket_path.clone());
    if !client.is_running().await {
        return Err(McpxError::Network(
            "daemon is not running; start it with 'mcpx daemon start'".to_string(),
        ));
    }

    let already = client
        .connect(server, config, &loaded.source)
        .await
        .map_err(McpxError::network)?;

    if already {
        println!("Server '{server}' is already connected.");
    } else {
        println!("Connected '{server}'.");
    }
    Ok(())
}

pub async fn run_disconnect(settings: &Settings, server: &str) -> Result<(), McpxError> {
    let client = DaemonClient::new(settings.socket_path.clone());
    if !client.is_running().await {
        return Err(McpxError::Network(
            "daemon is not running; start it with 'mcpx daemon start'".to_string(),
        ));
    }

    let present = client.disconnect(server).await.map_err(McpxError::network)?;
    if present {
        println!("Disconnected '{server}'.");
    } else {
        println!("Server '{server}' was not connected.");
    }
    Ok(())
}
