//! `info` command: show one tool's schema, or a server overview.

use crate::config::{LoadedConfig, Settings};
use crate::error::McpxError;
use crate::handlers::list::scan_servers;
use crate::output::summary_line;
use crate::tools::suggest;

pub async fn run_info(
    loaded: &LoadedConfig,
    settings: &Settings,
    target: &str,
    json: bool,
) -> Result<(), McpxError> {
    let (server, tool) = match target.split_once('/') {
        Some((server, tool)) if !server.is_empty() && !tool.is_empty() => {
            (server.to_string(), Some(tool.to_string()))
        }
        Some(_) => {
            return Err(McpxError::Client(format!(
                "invalid target '{target}': expected server or server/tool"
            )))
        }
        None => (target.to_string(), None),
    };

    loaded.server(&server)?;
    let names = vec![server.clone()];
    let listings = scan_servers(loaded, settings, &names).await;
    let listing = listings
        .into_iter()
        .next()
        .ok_or_else(|| McpxError::Client(format!("unknown server '{server}'")))?;

    if let Some(error) = listing.error {
        return Err(McpxError::Network(format!(
            "cannot reach server '{server}': {error}"
        )));
    }

    match tool {
        None => {
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&listing)
                        .map_err(|e| McpxError::Client(format!("cannot serialize info: {e}")))?
                );
                return Ok(());
            }
            println!("Server: {server} ({} tools)", listing.tools.len());
            if let Some(instructions) = &listing.instructions {
                println!("\n{instructions}\n");
            }
            for tool in &listing.tools {
                println!(
                    "  {} - {}",
                    tool.name,
                    summary_line(tool.description.as_deref(), 72)
                );
            }
            Ok(())
        }
        Some(tool_name) => {
            let found = listing.tools.iter().find(|t| t.name == tool_name);
            let Some(found) = found else {
                let names: Vec<String> =
                    listing.tools.iter().map(|t| t.name.clone()).collect();
                let hints = suggest::find_similar(&tool_name, &names, 3);
                let mut message = format!("tool '{tool_name}' not found on server '{server}'");
                if !hints.is_empty() {
                    message.push_str(&format!("; did you mean {}?", hints.join(", ")));
                }
                return Err(McpxError::Tool(message));
            };

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(found)
                        .map_err(|e| McpxError::Client(format!("cannot serialize info: {e}")))?
                );
                return Ok(());
            }

            println!("{}/{}", server, found.name);
            if let Some(description) = &found.description {
                println!("\n{description}");
            }
            if let Some(schema) = &found.input_schema {
                println!(
                    "\nInput schema:\n{}",
                    serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
                );
            }
            Ok(())
        }
    }
}
