//! Client for talking to the daemon over its Unix socket.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tokio::io::BufReader;
use tokio::net::UnixStream;

use crate::config::ServerConfig;
use crate::daemon::http;
use crate::daemon::protocol::{DaemonRequest, DaemonResponse, PooledServerInfo, RequestParams};
use crate::mcp::types::ToolOutcome;

#[derive(Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// Readiness probe: the socket file must exist AND a `list`
    /// round-trip must succeed. Presence alone is not enough, stale
    /// sockets happen.
    pub async fn is_running(&self) -> bool {
        self.socket_exists() && self.list().await.is_ok()
    }

    pub async fn connect(
        &self,
        server: &str,
        config: &ServerConfig,
        source: &str,
    ) -> Result<bool> {
        let response = self
            .request(
                "connect",
                RequestParams {
                    server: Some(server.to_string()),
                    config: Some(config.clone()),
                    config_source: Some(source.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(response.already_connected.unwrap_or(false))
    }

    pub async fn call(
        &self,
        server: &str,
        config: Option<&ServerConfig>,
        source: &str,
        tool: &str,
        args: Option<Value>,
    ) -> Result<ToolOutcome> {
        let response = self
            .request(
                "call",
                RequestParams {
                    server: Some(server.to_string()),
                    config: config.cloned(),
                    config_source: Some(source.to_string()),
                    tool: Some(tool.to_string()),
                    args,
                },
            )
            .await?;
        let raw = response.result.context("daemon reply missing result")?;
        serde_json::from_value(raw).context("malformed tool result from daemon")
    }

    /// Returns whether the server was present.
    pub async fn disconnect(&self, server: &str) -> Result<bool> {
        let response = self
            .request(
                "disconnect",
                RequestParams {
                    server: Some(server.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(response.ok.unwrap_or(false))
    }

    pub async fn has(&self, server: &str) -> Result<bool> {
        let response = self
            .request(
                "has",
                RequestParams {
                    server: Some(server.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(response.has.unwrap_or(false))
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        let response = self.request("list", RequestParams::default()).await?;
        Ok(response.servers.unwrap_or_default())
    }

    pub async fn list_detailed(&self) -> Result<Vec<PooledServerInfo>> {
        let response = self
            .request("list-detailed", RequestParams::default())
            .await?;
        Ok(response.servers_detailed.unwrap_or_default())
    }

    /// Ask the daemon to release everything and exit; returns the names
    /// it was holding.
    pub async fn shutdown(&self) -> Result<Vec<String>> {
        let response = self.request("shutdown", RequestParams::default()).await?;
        Ok(response.servers.unwrap_or_default())
    }

    async fn request(&self, method: &str, params: RequestParams) -> Result<DaemonResponse> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .with_context(|| {
                format!(
                    "failed to connect to daemon at {}",
                    self.socket_path.display()
                )
            })?;
        let (read_half, mut write_half) = stream.split();
        let mut reader = BufReader::new(read_half);

        let body = serde_json::to_vec(&DaemonRequest {
            method: method.to_string(),
            params,
        })?;
        http::write_request(&mut write_half, &body).await?;

        let (_status, body) = http::read_response(&mut reader).await?;
        let response: DaemonResponse =
            serde_json::from_slice(&body).context("failed to parse daemon response")?;

        if let Some(error) = response.error {
            bail!("{error}");
        }
        Ok(response)
    }
}
