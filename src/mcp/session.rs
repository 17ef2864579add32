//! Uniform session interface over the two MCP transports.
//!
//! A [`Session`] is an established MCP client bound to one server. The
//! trait seam keeps the pool and router testable without spawning real
//! servers; the rmcp-backed implementation lives here too.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rmcp::{
    model::CallToolRequestParam,
    service::RunningService,
    RoleClient,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::mcp::types::{ToolInfo, ToolOutcome};

/// Capability set of an open MCP session. Calls are serialized per
/// session; `close` must be invoked on every control-flow exit.
#[async_trait]
pub trait Session: Send + Sync {
    /// Server-advertised instructions captured at handshake.
    fn instructions(&self) -> Option<String>;

    async fn list_tools(&self) -> Result<Vec<ToolInfo>>;

    async fn call_tool(&self, tool: &str, args: Option<Value>) -> Result<ToolOutcome>;

    async fn close(&self) -> Result<()>;
}

/// Builds a live session from a server config. The production factory
/// wraps connect in the retry policy; tests inject mocks.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, name: &str, config: &ServerConfig) -> Result<Arc<dyn Session>>;
}

/// A session backed by an rmcp client service. Stdio sessions also own
/// their stderr-forwarder task so `close` can reap it.
pub struct RmcpSession {
    name: String,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
    instructions: Option<String>,
    stderr_forwarder: Option<JoinHandle<()>>,
}

impl RmcpSession {
    pub(crate) fn new(
        name: String,
        service: RunningService<RoleClient, ()>,
        stderr_forwarder: Option<JoinHandle<()>>,
    ) -> Self {
        let instructions = service
            .peer_info()
            .and_then(|info| info.instructions.clone());
        Self {
            name,
            service: Mutex::new(Some(service)),
            instructions,
            stderr_forwarder,
        }
    }
}

#[async_trait]
impl Session for RmcpSession {
    fn instructions(&self) -> Option<String> {
        self.instructions.clone()
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let guard = self.service.lock().await;
        let service = guard
            .as_ref()
            .with_context(|| format!("session '{}' already closed", self.name))?;

        let response = service
            .list_tools(Default::default())
            .await
            .context("failed to list tools")?;

        Ok(response
            .tools
            .into_iter()
            .map(|t| ToolInfo {
                server: self.name.clone(),
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()),
                input_schema: Some(serde_json::to_value(&t.input_schema).unwrap_or_default()),
            })
            .collect())
    }

    async fn call_tool(&self, tool: &str, args: Option<Value>) -> Result<ToolOutcome> {
        let guard = self.service.lock().await;
        let service = guard
            .as_ref()
            .with_context(|| format!("session '{}' already closed", self.name))?;

        let arguments = args.and_then(|v| v.as_object().cloned());
        let result = service
            .call_tool(CallToolRequestParam {
                name: tool.to_string().into(),
                arguments,
            })
            .await
            .with_context(|| format!("failed to call tool '{tool}'"))?;

        let is_error = result.is_error.unwrap_or(false);
        let raw = serde_json::to_value(&result).context("failed to serialize tool result")?;
        Ok(ToolOutcome { raw, is_error })
    }

    async fn close(&self) -> Result<()> {
        let service = self.service.lock().await.take();
        if let Some(service) = service {
            tracing::debug!("closing session '{}'", self.name);
            if let Err(e) = service.cancel().await {
                tracing::warn!("error closing session '{}': {}", self.name, e);
            }
        }
        // Cancelling the service tears down the child; the forwarder
        // normally exits at stderr EOF, the abort covers the rest.
        if let Some(forwarder) = &self.stderr_forwarder {
            forwarder.abort();
        }
        Ok(())
    }
}
