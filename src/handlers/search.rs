//! `search` command: glob-match tool names across all servers.

use crate::config::{LoadedConfig, Settings};
use crate::error::McpxError;
use crate::handlers::list::scan_servers;
use crate::mcp::types::ToolInfo;
use crate::output::summary_line;
use crate::tools::filter::glob_match;
use crate::tools::suggest;

pub async fn run_search(
    loaded: &LoadedConfig,
    settings: &Settings,
    pattern: &str,
    json: bool,
) -> Result<(), McpxError> {
    let names = loaded.config.server_names();
    if names.is_empty() {
        println!("No servers configured. Create a .mcp.json or pass -c.");
        return Ok(());
    }

    let listings = scan_servers(loaded, settings, &names).await;

    for listing in &listings {
        if let Some(error) = &listing.error {
            eprintln!("warning: skipping '{}': {error}", listing.name);
        }
    }

    let all_tools: Vec<&ToolInfo> = listings.iter().flat_map(|l| l.tools.iter()).collect();
    let matches: Vec<&&ToolInfo> = all_tools
        .iter()
        .filter(|tool| matches_pattern(pattern, &tool.server, &tool.name))
        .collect();

    if json {
        let found: Vec<&ToolInfo> = matches.iter().map(|t| **t).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&found)
                .map_err(|e| McpxError::Client(format!("cannot serialize matches: {e}")))?
        );
        return Ok(());
    }

    if matches.is_empty() {
        println!("No tools match '{pattern}'.");
        // A literal pattern that matched nothing gets a fuzzy hint.
        if !pattern.contains(['*', '?']) {
            let names: Vec<String> = all_tools.iter().map(|t| t.name.clone()).collect();
            let hints = suggest::find_similar(pattern, &names, 3);
            if !hints.is_empty() {
                println!("Did you mean: {}?", hints.join(", "));
            }
        }
        return Ok(());
    }

    for tool in matches {
        println!(
            "{}/{} - {}",
            tool.server,
            tool.name,
            summary_line(tool.description.as_deref(), 72)
        );
    }

    Ok(())
}

/// A pattern containing `/` matches against `server/tool`, otherwise
/// against the bare tool name. Matching is case-insensitive.
fn matches_pattern(pattern: &str, server: &str, tool: &str) -> bool {
    let pattern = pattern.to_lowercase();
    if pattern.contains('/') {
        glob_match(&pattern, &format!("{server}/{tool}").to_lowercase())
    } else {
        glob_match(&pattern, &tool.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_pattern_matches_tool_name() {
        assert!(matches_pattern("nav*", "browser", "navigate"));
        assert!(!matches_pattern("nav*", "browser", "screenshot"));
    }

    #[test]
    fn test_qualified_pattern_matches_server_and_tool() {
        assert!(matches_pattern("browser/*", "browser", "navigate"));
        assert!(!matches_pattern("browser/*", "fs", "navigate"));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert!(matches_pattern("NAV*", "browser", "navigate"));
    }
}
