//! Rendering helpers for tool listings and call results.

use serde_json::Value;

use crate::mcp::types::ToolOutcome;

/// First line of a description, truncated for one-line listings.
pub fn summary_line(description: Option<&str>, max_len: usize) -> String {
    let first = description
        .unwrap_or("No description")
        .lines()
        .next()
        .unwrap_or("");
    if first.len() > max_len {
        let cut: String = first.chars().take(max_len).collect();
        format!("{cut}...")
    } else {
        first.to_string()
    }
}

/// Extract the text content blocks from a tool result; falls back to
/// pretty JSON when the result has no text content.
pub fn render_outcome(outcome: &ToolOutcome) -> String {
    let texts: Vec<&str> = outcome
        .raw
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if texts.is_empty() {
        serde_json::to_string_pretty(&outcome.raw).unwrap_or_else(|_| outcome.raw.to_string())
    } else {
        texts.join("\n")
    }
}
