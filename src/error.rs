//! Error taxonomy for the CLI surface.
//!
//! The substrate (transports, retry, pool) propagates `anyhow::Error`;
//! the router and handlers classify failures into one of four kinds,
//! which determine the process exit code.

use thiserror::Error;

/// A classified failure, surfaced to the user with an exit code.
#[derive(Debug, Error)]
pub enum McpxError {
    /// Bad target syntax, invalid JSON args, unknown server, disabled tool.
    #[error("{0}")]
    Client(String),

    /// Tool not found on a reachable server, or the tool reported an error.
    #[error("{0}")]
    Tool(String),

    /// Connect, dial, handshake, or retry-exhausted transient failure.
    #[error("{0}")]
    Network(String),

    /// Missing file, invalid JSON, mutually exclusive fields.
    #[error("{0}")]
    Config(String),
}

impl McpxError {
    pub fn kind(&self) -> &'static str {
        match self {
            McpxError::Client(_) => "client",
            McpxError::Tool(_) => "tool",
            McpxError::Network(_) => "network",
            McpxError::Config(_) => "config",
        }
    }

    /// Exit codes: 0 success, 1 client/config error, 2 server/tool error,
    /// 3 network error.
    pub fn exit_code(&self) -> i32 {
        match self {
            McpxError::Client(_) | McpxError::Config(_) => 1,
            McpxError::Tool(_) => 2,
            McpxError::Network(_) => 3,
        }
    }

    /// Wrap an underlying error as network-kind, keeping its chain text.
    pub fn network(err: anyhow::Error) -> Self {
        McpxError::Network(format!("{err:#}"))
    }
}

/// Advisory hint selected by substring inspection of the failure message.
pub fn suggestion_for(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    if lower.contains("enoent") || lower.contains("no such file") || lower.contains("not found in path") {
        return Some("check that the server command exists and is on PATH");
    }
    if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("forbidden")
        || lower.contains("auth")
    {
        return Some("check the credentials or headers configured for this server");
    }
    if lower.contains("429") || lower.contains("rate limit") {
        return Some("the server is rate limiting; wait a moment and retry");
    }
    if lower.contains("timeout") || lower.contains("timed out") {
        return Some("the server did not respond in time; raise MCP_TIMEOUT or check the server");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(McpxError::Client("x".into()).exit_code(), 1);
        assert_eq!(McpxError::Config("x".into()).exit_code(), 1);
        assert_eq!(McpxError::Tool("x".into()).exit_code(), 2);
        assert_eq!(McpxError::Network("x".into()).exit_code(), 3);
    }

    #[test]
    fn test_suggestion_for_common_causes() {
        assert!(suggestion_for("spawn failed: No such file or directory").is_some());
        assert!(suggestion_for("server replied 401 Unauthorized").is_some());
        assert!(suggestion_for("429 Too Many Requests").is_some());
        assert!(suggestion_for("handshake timed out").is_some());
        assert!(suggestion_for("some unrelated failure").is_none());
    }
}
