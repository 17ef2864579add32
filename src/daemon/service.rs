//! The daemon process: a Unix-socket server owning the connection pool.
//!
//! Requests are handled strictly in arrival order; the idle-eviction
//! sweep and signal handlers are arms of the same `select!`, so all pool
//! mutation is serialized through this loop.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::MissedTickBehavior;

use crate::config::{ServerConfig, SOURCE_NONE};
use crate::daemon::client::DaemonClient;
use crate::daemon::http;
use crate::daemon::pool::ConnectionPool;
use crate::daemon::protocol::{DaemonRequest, DaemonResponse};

/// Idle-eviction sweep cadence.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// How long the shutdown reply is given to flush before the loop exits.
const SHUTDOWN_LINGER: Duration = Duration::from_millis(100);

pub struct DaemonService {
    pool: ConnectionPool,
    socket_path: PathBuf,
}

impl DaemonService {
    pub fn new(pool: ConnectionPool, socket_path: PathBuf) -> Self {
        Self { pool, socket_path }
    }

    /// Bind the socket and serve until shutdown is requested or a
    /// termination signal arrives. On exit every pooled session is
    /// closed and the socket file unlinked.
    pub async fn run(mut self) -> Result<()> {
        // A socket file alone does not imply liveness; only a answering
        // daemon blocks startup. A stale file is removed below.
        if DaemonClient::new(self.socket_path.clone()).is_running().await {
            bail!(
                "another daemon is already listening on {}",
                self.socket_path.display()
            );
        }

        if let Some(parent) = self.socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let _ = tokio::fs::remove_file(&self.socket_path).await;

        let listener = UnixListener::bind(&self.socket_path).with_context(|| {
            format!(
                "failed to bind daemon socket {} (remove the file if stale)",
                self.socket_path.display()
            )
        })?;
        tracing::info!("daemon listening on {}", self.socket_path.display());

        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => match self.handle_connection(stream).await {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(e) => tracing::warn!("connection error: {e:#}"),
                        },
                        Err(e) => tracing::error!("accept error: {e}"),
                    }
                }
                _ = sweep.tick() => self.pool.evict_idle().await,
                _ = sigint.recv() => {
                    tracing::info!("received SIGINT, shutting down");
                    break;
                }
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM, shutting down");
                    break;
                }
            }
        }

        let released = self.pool.release_all().await;
        if !released.is_empty() {
            tracing::info!("released servers: {}", released.join(", "));
        }
        let _ = tokio::fs::remove_file(&self.socket_path).await;
        tracing::info!("daemon stopped");
        Ok(())
    }

    /// One request per connection. Returns true when the daemon should
    /// exit (shutdown was acknowledged).
    async fn handle_connection(&mut self, mut stream: UnixStream) -> Result<bool> {
        let (read_half, mut write_half) = stream.split();
        let mut reader = BufReader::new(read_half);

        let body = match http::read_request(&mut reader).await {
            Ok(body) => body,
            Err(e) => {
                let payload = serde_json::to_vec(&DaemonResponse::err(format!("bad request: {e}")))?;
                http::write_response(&mut write_half, 400, &payload).await?;
                return Ok(false);
            }
        };

        let request: DaemonRequest = match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(_) => {
                let payload = serde_json::to_vec(&DaemonResponse::err("invalid JSON"))?;
                http::write_response(&mut write_half, 400, &payload).await?;
                return Ok(false);
            }
        };

        let method = request.method.clone();
        tracing::debug!("handling '{method}'");
        let (status, response) = self.dispatch(request).await;
        let shutting_down = method == "shutdown" && status == 200;

        let payload = serde_json::to_vec(&response)?;
        http::write_response(&mut write_half, status, &payload).await?;

        if shutting_down {
            // Give the reply time to flush before the process exits.
            tokio::time::sleep(SHUTDOWN_LINGER).await;
        }
        Ok(shutting_down)
    }

    async fn dispatch(&mut self, request: DaemonRequest) -> (u16, DaemonResponse) {
        let params = request.params;
        match request.method.as_str() {
            "connect" => {
                let Some(server) = params.server else {
                    return missing("server");
                };
                let Some(config) = params.config else {
                    return missing("config");
                };
                let source = params
                    .config_source
                    .unwrap_or_else(|| SOURCE_NONE.to_string());
                match self.pool.acquire(&server, &config, &source).await {
                    Ok(outcome) => (
                        200,
                        DaemonResponse {
                            ok: Some(true),
                            already_connected: Some(outcome.already_connected),
                            ..Default::default()
                        },
                    ),
                    Err(e) => (500, DaemonResponse::err(format!("{e:#}"))),
                }
            }

            "call" => {
                let Some(server) = params.server else {
                    return missing("server");
                };
                let Some(tool) = params.tool else {
                    return missing("tool");
                };
                match self
                    .call_tool(
                        &server,
                        params.config.as_ref(),
                        params.config_source.as_deref(),
                        &tool,
                        params.args,
                    )
                    .await
                {
                    Ok(result) => (
                        200,
                        DaemonResponse {
                            result: Some(result),
                            ..Default::default()
                        },
                    ),
                    Err(e) => (500, DaemonResponse::err(format!("{e:#}"))),
                }
            }

            "disconnect" => {
                let Some(server) = params.server else {
                    return missing("server");
                };
                let present = self.pool.release(&server).await;
                (
                    200,
                    DaemonResponse {
                        ok: Some(present),
                        ..Default::default()
                    },
                )
            }

            "has" => {
                let Some(server) = params.server else {
                    return missing("server");
                };
                (
                    200,
                    DaemonResponse {
                        has: Some(self.pool.has(&server)),
                        ..Default::default()
                    },
                )
            }

            "list" => (
                200,
                DaemonResponse {
                    servers: Some(self.pool.list()),
                    ..Default::default()
                },
            ),

            "list-detailed" => (
                200,
                DaemonResponse {
                    servers_detailed: Some(self.pool.list_detailed()),
                    ..Default::default()
                },
            ),

            "shutdown" => {
                let released = self.pool.release_all().await;
                tracing::info!("shutdown requested, released {} servers", released.len());
                (
                    200,
                    DaemonResponse {
                        ok: Some(true),
                        servers: Some(released),
                        ..Default::default()
                    },
                )
            }

            other => (400, DaemonResponse::err(format!("unknown method '{other}'"))),
        }
    }

    async fn call_tool(
        &mut self,
        server: &str,
        config: Option<&ServerConfig>,
        source: Option<&str>,
        tool: &str,
        args: Option<Value>,
    ) -> Result<Value> {
        let session = match config {
            Some(config) => {
                self.pool
                    .acquire(server, config, source.unwrap_or(SOURCE_NONE))
                    .await?
                    .session
            }
            None => self
                .pool
                .session(server)
                .with_context(|| format!("server '{server}' not connected and no config provided"))?,
        };

        let outcome = session.call_tool(tool, args).await?;
        Ok(serde_json::to_value(&outcome)?)
    }
}

fn missing(field: &str) -> (u16, DaemonResponse) {
    (
        400,
        DaemonResponse::err(format!("missing required param: {field}")),
    )
}
