//! `call` command: invoke one tool through the router.

use crate::config::{LoadedConfig, Settings};
use crate::error::McpxError;
use crate::output::render_outcome;
use crate::router::{read_stdin_args, CallTarget, Router};

pub async fn run_call(
    loaded: &LoadedConfig,
    settings: &Settings,
    target_raw: &str,
    args_raw: Option<String>,
    json: bool,
) -> Result<(), McpxError> {
    let target = CallTarget::parse(target_raw)?;

    let args = match args_raw {
        Some(text) => Some(
            serde_json::from_str(&text)
                .map_err(|e| McpxError::Client(format!("invalid JSON arguments: {e}")))?,
        ),
        None => read_stdin_args(settings).await?,
    };
    if let Some(value) = &args {
        if !value.is_object() {
            return Err(McpxError::Client(
                "tool arguments must be a JSON object".to_string(),
            ));
        }
    }

    let router = Router::new(settings.clone());
    let outcome = router.call_tool(loaded, &target, args).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome.raw).unwrap_or_else(|_| outcome.raw.to_string())
        );
    } else {
        println!("{}", render_outcome(&outcome));
    }

    if outcome.is_error {
        return Err(McpxError::Tool(format!(
            "tool '{target_raw}' reported an error"
        )));
    }
    Ok(())
}
