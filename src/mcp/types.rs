//! Shared MCP data types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool advertised by an MCP server. The input schema is an opaque
/// JSON-Schema-shaped object passed through verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub server: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// Result of one tool invocation: the server's response serialized as-is,
/// plus whether the tool itself reported an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub raw: Value,
    pub is_error: bool,
}
