//! Invocation routing: daemon session reuse vs. ephemeral one-shot.
//!
//! For each tool call the router checks the disabled-tool filters first,
//! then probes the daemon; a server registered there gets its pooled
//! session, anything else gets an ephemeral session that is closed on
//! every exit path.

use std::time::Instant;

use serde_json::Value;
use tokio::io::AsyncReadExt;

use crate::config::{LoadedConfig, ServerConfig, Settings};
use crate::daemon::client::DaemonClient;
use crate::error::McpxError;
use crate::mcp::factory::open_session;
use crate::mcp::retry::RetryConfig;
use crate::mcp::types::ToolOutcome;
use crate::tools::suggest;

/// A parsed `server/tool` target.
#[derive(Debug, Clone, PartialEq)]
pub struct CallTarget {
    pub server: String,
    pub tool: String,
}

impl CallTarget {
    pub fn parse(raw: &str) -> Result<Self, McpxError> {
        match raw.split_once('/') {
            Some((server, tool)) if !server.is_empty() && !tool.is_empty() => Ok(Self {
                server: server.to_string(),
                tool: tool.to_string(),
            }),
            _ => Err(McpxError::Client(format!(
                "invalid target '{raw}': expected server/tool"
            ))),
        }
    }
}

pub struct Router {
    settings: Settings,
}

impl Router {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub async fn call_tool(
        &self,
        loaded: &LoadedConfig,
        target: &CallTarget,
        args: Option<Value>,
    ) -> Result<ToolOutcome, McpxError> {
        let config = loaded.server(&target.server)?;

        // Disabled tools are refused before any session is opened.
        if !config.filters.allows(&target.server, &target.tool) {
            let detail = config
                .filters
                .blocking_pattern(&target.server, &target.tool)
                .map(|p| format!(" (blocked by '{p}')"))
                .unwrap_or_default();
            return Err(McpxError::Client(format!(
                "tool '{}/{}' is disabled by configuration{detail}",
                target.server, target.tool
            )));
        }

        let daemon = DaemonClient::new(self.settings.socket_path.clone());
        if daemon.socket_exists() {
            if let Ok(true) = daemon.has(&target.server).await {
                tracing::debug!(
                    "routing '{}/{}' through the daemon",
                    target.server,
                    target.tool
                );
                return daemon
                    .call(
                        &target.server,
                        Some(config),
                        &loaded.source,
                        &target.tool,
                        args,
                    )
                    .await
                    .map_err(|e| classify_daemon_error(&target.tool, e));
            }
        }

        self.call_ephemeral(target, config, args).await
    }

    async fn call_ephemeral(
        &self,
        target: &CallTarget,
        config: &ServerConfig,
        args: Option<Value>,
    ) -> Result<ToolOutcome, McpxError> {
        let retry = RetryConfig::from_settings(&self.settings);
        let deadline = Instant::now() + self.settings.timeout;

        let session = open_session(&target.server, config, &retry, deadline)
            .await
            .map_err(McpxError::network)?;

        match session.call_tool(&target.tool, args).await {
            Ok(outcome) => {
                let _ = session.close().await;
                Ok(outcome)
            }
            Err(e) => {
                // Best-effort listing feeds a "did you mean" hint; the
                // session is closed either way.
                let names: Vec<String> = session
                    .list_tools()
                    .await
                    .map(|tools| tools.into_iter().map(|t| t.name).collect())
                    .unwrap_or_default();
                let _ = session.close().await;

                let mut message =
                    format!("tool '{}/{}' failed: {e:#}", target.server, target.tool);
                let hints = suggest::find_similar(&target.tool, &names, 3);
                if !hints.is_empty() {
                    message.push_str(&format!("; did you mean {}?", hints.join(", ")));
                }
                Err(McpxError::Tool(message))
            }
        }
    }
}

fn classify_daemon_error(tool: &str, err: anyhow::Error) -> McpxError {
    let message = format!("{err:#}");
    let lower = message.to_lowercase();
    if lower.contains("not found") || lower.contains("unknown tool") {
        McpxError::Tool(format!("tool '{tool}' not found: {message}"))
    } else {
        McpxError::Tool(format!("tool '{tool}' failed: {message}"))
    }
}

/// When no explicit JSON was given and stdin is not a terminal, read it
/// to EOF under the shared budget. The timeout future is dropped on
/// completion, so no timer outlives the read.
pub async fn read_stdin_args(settings: &Settings) -> Result<Option<Value>, McpxError> {
    use std::io::IsTerminal;
    if std::io::stdin().is_terminal() {
        return Ok(None);
    }

    let mut input = String::new();
    let read = tokio::time::timeout(
        settings.timeout,
        tokio::io::stdin().read_to_string(&mut input),
    )
    .await;

    match read {
        Ok(Ok(_)) => {
            let trimmed = input.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                let value: Value = serde_json::from_str(trimmed)
                    .map_err(|e| McpxError::Client(format!("invalid JSON on stdin: {e}")))?;
                Ok(Some(value))
            }
        }
        Ok(Err(e)) => Err(McpxError::Client(format!("failed to read stdin: {e}"))),
        Err(_) => Err(McpxError::Client(
            "timed out reading arguments from stdin".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        let target = CallTarget::parse("browser/navigate").unwrap();
        assert_eq!(target.server, "browser");
        assert_eq!(target.tool, "navigate");
    }

    #[test]
    fn test_parse_target_keeps_extra_slashes_in_tool() {
        let target = CallTarget::parse("fs/read/deep").unwrap();
        assert_eq!(target.server, "fs");
        assert_eq!(target.tool, "read/deep");
    }

    #[test]
    fn test_parse_target_rejects_bad_shapes() {
        assert!(CallTarget::parse("no-slash").is_err());
        assert!(CallTarget::parse("/tool").is_err());
        assert!(CallTarget::parse("server/").is_err());
        assert!(CallTarget::parse("").is_err());
    }

    #[tokio::test]
    async fn test_disabled_tool_refused_before_any_session() {
        // The config points at a nonexistent binary: if the router tried
        // to open a session the error would be network-kind, so a
        // client-kind error proves it refused up front.
        let loaded = LoadedConfig::load(Some(
            r#"{"mcpServers": {"locked": {"command": "/nonexistent/definitely-not-a-binary", "disabledTools": ["*/*"]}}}"#,
        ))
        .unwrap();
        let router = Router::new(Settings::default());
        let target = CallTarget::parse("locked/anything").unwrap();

        let err = router.call_tool(&loaded, &target, None).await.unwrap_err();
        assert_eq!(err.kind(), "client");
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn test_daemon_error_classification() {
        let not_found = classify_daemon_error("nav", anyhow::anyhow!("tool not found"));
        assert!(matches!(not_found, McpxError::Tool(_)));
        assert!(not_found.to_string().contains("not found"));

        let unknown = classify_daemon_error("nav", anyhow::anyhow!("Unknown tool: nav"));
        assert!(unknown.to_string().contains("not found"));

        let failed = classify_daemon_error("nav", anyhow::anyhow!("boom"));
        assert!(failed.to_string().contains("failed"));
    }

    #[tokio::test]
    async fn test_unknown_server_is_client_error() {
        let loaded = LoadedConfig::load(Some(r#"{"mcpServers": {}}"#)).unwrap();
        let router = Router::new(Settings::default());
        let target = CallTarget::parse("ghost/tool").unwrap();

        let err = router.call_tool(&loaded, &target, None).await.unwrap_err();
        assert_eq!(err.kind(), "client");
    }
}
