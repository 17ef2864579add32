//! `list` command: enumerate tools across servers with a bounded fan-out.

use std::time::Instant;

use serde::Serialize;

use crate::config::{LoadedConfig, ServerConfig, Settings};
use crate::error::McpxError;
use crate::mcp::factory::open_session;
use crate::mcp::retry::{with_retry, RetryConfig};
use crate::mcp::runner::run_bounded;
use crate::mcp::types::ToolInfo;
use crate::output::summary_line;

/// One server's scan result. A failed server keeps its slot with `error`
/// set instead of poisoning the batch.
#[derive(Debug, Serialize)]
pub struct ServerListing {
    pub name: String,
    pub tools: Vec<ToolInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn run_list(
    loaded: &LoadedConfig,
    settings: &Settings,
    server: Option<String>,
    json: bool,
) -> Result<(), McpxError> {
    let names = match server {
        Some(name) => {
            loaded.server(&name)?;
            vec![name]
        }
        None => loaded.config.server_names(),
    };

    if names.is_empty() {
        println!("No servers configured. Create a .mcp.json or pass -c.");
        return Ok(());
    }

    let listings = scan_servers(loaded, settings, &names).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&listings)
                .map_err(|e| McpxError::Client(format!("cannot serialize listing: {e}")))?
        );
        return Ok(());
    }

    for listing in &listings {
        match &listing.error {
            Some(error) => println!("=== {} ===\n  error: {error}\n", listing.name),
            None => {
                println!("=== {} ({} tools) ===", listing.name, listing.tools.len());
                for tool in &listing.tools {
                    println!(
                        "  {} - {}",
                        tool.name,
                        summary_line(tool.description.as_deref(), 72)
                    );
                }
                println!();
            }
        }
    }

    Ok(())
}

/// Fan out over `names` (already sorted by the caller for stable output)
/// and collect each server's tools. Per-server isolation: failures land
/// in the result's `error` field and never abort the batch.
pub(crate) async fn scan_servers(
    loaded: &LoadedConfig,
    settings: &Settings,
    names: &[String],
) -> Vec<ServerListing> {
    let items: Vec<(String, ServerConfig)> = names
        .iter()
        .filter_map(|name| {
            loaded
                .config
                .mcp_servers
                .get(name)
                .map(|config| (name.clone(), config.clone()))
        })
        .collect();
    let item_names: Vec<String> = items.iter().map(|(name, _)| name.clone()).collect();

    let retry = RetryConfig::from_settings(settings);
    let budget = settings.timeout;

    let results = run_bounded(items, settings.concurrency, move |(name, config), _| {
        async move {
            let deadline = Instant::now() + budget;
            let session = match open_session(&name, &config, &retry, deadline).await {
                Ok(session) => session,
                Err(e) => {
                    return ServerListing {
                        name,
                        tools: Vec::new(),
                        instructions: None,
                        error: Some(format!("{e:#}")),
                    }
                }
            };

            let listed = with_retry(&format!("list '{name}'"), &retry, deadline, || {
                session.list_tools()
            })
            .await;
            let instructions = session.instructions();
            let _ = session.close().await;

            match listed {
                Ok(tools) => {
                    let tools = tools
                        .into_iter()
                        .filter(|tool| config.filters.allows(&name, &tool.name))
                        .collect();
                    ServerListing {
                        name,
                        tools,
                        instructions,
                        error: None,
                    }
                }
                Err(e) => ServerListing {
                    name,
                    tools: Vec::new(),
                    instructions: None,
                    error: Some(format!("{e:#}")),
                },
            }
        }
    })
    .await;

    // A slot the runner reports as failed (a panicked processor) still
    // keeps its position, carrying the failure as that server's error.
    results
        .into_iter()
        .zip(item_names)
        .map(|(result, name)| {
            result.unwrap_or_else(|message| ServerListing {
                name,
                tools: Vec::new(),
                instructions: None,
                error: Some(message),
            })
        })
        .collect()
}
