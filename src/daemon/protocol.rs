//! Wire types for CLI ↔ daemon communication.
//!
//! Requests and responses are single-shot JSON frames carried over an
//! HTTP POST envelope on the Unix socket (see [`super::http`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ServerConfig;

/// Request from the CLI to the daemon: a method name plus params.
/// Methods: `connect`, `call`, `disconnect`, `has`, `list`,
/// `list-detailed`, `shutdown`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub method: String,
    #[serde(default)]
    pub params: RequestParams,
}

/// Method-specific params, all optional at the wire level; each handler
/// rejects requests missing its required fields with a 400.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ServerConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// Response from the daemon. At most one of the payload fields is set,
/// plus `ok` and/or `error` as the method requires.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DaemonResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers_detailed: Option<Vec<PooledServerInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_connected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// One pooled server as reported by `list-detailed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PooledServerInfo {
    pub name: String,
    pub transport: String,
    pub config_source: String,
    pub idle_seconds: u64,
}
