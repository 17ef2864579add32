//! Configuration loading
//!
//! Server definitions come from a `.mcp.json` style file (`mcpServers` map),
//! an explicit `-c <path>` argument, or inline JSON passed to `-c`. Each
//! server entry is either a subprocess to spawn (stdio transport) or a
//! remote endpoint (streaming HTTP transport); the two shapes are mutually
//! exclusive and validated at load time, before any connection is made.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::McpxError;
use crate::tools::filter::ToolFilters;

/// Config source shown in `daemon status` when servers were defined inline.
pub const SOURCE_INLINE: &str = "<inline>";
/// Config source when no config file was found at all.
pub const SOURCE_NONE: &str = "<none>";

/// A validated server definition: exactly one transport plus tool filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawServerConfig", into = "RawServerConfig")]
pub struct ServerConfig {
    pub transport: Transport,
    pub filters: ToolFilters,
}

/// How to reach a server. Stdio spawns a child process; Http dials a
/// remote endpoint speaking the streamable HTTP variant of MCP.
#[derive(Debug, Clone, PartialEq)]
pub enum Transport {
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
        cwd: Option<String>,
    },
    Http {
        url: String,
        headers: HashMap<String, String>,
        /// Per-request timeout in milliseconds.
        timeout: Option<u64>,
    },
}

impl ServerConfig {
    /// Transport kind as shown in `daemon status`.
    pub fn transport_kind(&self) -> &'static str {
        match self.transport {
            Transport::Stdio { .. } => "stdio",
            Transport::Http { .. } => "http",
        }
    }
}

/// The on-disk shape of a server entry. All fields optional; validation
/// into [`ServerConfig`] rejects ambiguous combinations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_tools: Option<Vec<String>>,
}

impl TryFrom<RawServerConfig> for ServerConfig {
    type Error = String;

    fn try_from(raw: RawServerConfig) -> Result<Self, Self::Error> {
        if raw.include_tools.is_some() && raw.allowed_tools.is_some() {
            return Err(
                "includeTools and allowedTools are aliases; specify only one".to_string(),
            );
        }
        let filters = ToolFilters {
            include: raw.include_tools.or(raw.allowed_tools),
            disabled: raw.disabled_tools.unwrap_or_default(),
        };

        let transport = match (raw.command, raw.url) {
            (Some(command), None) => Transport::Stdio {
                command,
                args: raw.args,
                env: raw.env,
                cwd: raw.cwd,
            },
            (None, Some(url)) => Transport::Http {
                url,
                headers: raw.headers,
                timeout: raw.timeout,
            },
            (Some(_), Some(_)) => {
                return Err("server config cannot have both 'command' and 'url'".to_string())
            }
            (None, None) => {
                return Err("server config needs either 'command' or 'url'".to_string())
            }
        };

        Ok(ServerConfig { transport, filters })
    }
}

impl From<ServerConfig> for RawServerConfig {
    fn from(config: ServerConfig) -> Self {
        let mut raw = RawServerConfig {
            include_tools: config.filters.include,
            disabled_tools: if config.filters.disabled.is_empty() {
                None
            } else {
                Some(config.filters.disabled)
            },
            ..Default::default()
        };
        match config.transport {
            Transport::Stdio {
                command,
                args,
                env,
                cwd,
            } => {
                raw.command = Some(command);
                raw.args = args;
                raw.env = env;
                raw.cwd = cwd;
            }
            Transport::Http {
                url,
                headers,
                timeout,
            } => {
                raw.url = Some(url);
                raw.headers = headers;
                raw.timeout = timeout;
            }
        }
        raw
    }
}

/// Stable digest of a server config: the config is serialized through
/// `serde_json::Value` (whose maps sort keys), so two configs that differ
/// only in key order hash identically.
pub fn config_hash(config: &ServerConfig) -> String {
    let canonical = serde_json::to_value(config)
        .and_then(|v| serde_json::to_string(&v))
        .unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// MCP server configuration (`mcpServers` map, as in `.mcp.json`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpConfig {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: HashMap<String, ServerConfig>,
}

impl McpConfig {
    /// Configured server names, sorted for stable output.
    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.mcp_servers.keys().cloned().collect();
        names.sort();
        names
    }
}

/// A config together with where it came from. The source string travels to
/// the daemon so `daemon status` can display provenance.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: McpConfig,
    pub source: String,
}

impl LoadedConfig {
    /// Resolve the `-c` argument: inline JSON, an explicit path, or
    /// discovery of `.mcp.json` up the directory tree.
    pub fn load(arg: Option<&str>) -> Result<Self, McpxError> {
        match arg {
            Some(text) if text.trim_start().starts_with('{') => {
                let config = parse_config(text)
                    .map_err(|e| McpxError::Config(format!("invalid inline config: {e}")))?;
                Ok(Self {
                    config,
                    source: SOURCE_INLINE.to_string(),
                })
            }
            Some(path) => Self::load_from_path(Path::new(path)),
            None => match find_config_file(".mcp.json") {
                Some(path) => Self::load_from_path(&path),
                None => {
                    tracing::debug!("no .mcp.json found, starting with empty config");
                    Ok(Self {
                        config: McpConfig::default(),
                        source: SOURCE_NONE.to_string(),
                    })
                }
            },
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, McpxError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            McpxError::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        let config = parse_config(&content).map_err(|e| {
            McpxError::Config(format!("invalid config {}: {e}", path.display()))
        })?;
        Ok(Self {
            config,
            source: path.display().to_string(),
        })
    }

    /// Look up a server by name, with a client-kind error naming the
    /// available servers when it is missing.
    pub fn server(&self, name: &str) -> Result<&ServerConfig, McpxError> {
        self.config.mcp_servers.get(name).ok_or_else(|| {
            let names = self.config.server_names();
            let mut msg = format!("unknown server '{name}'");
            if names.is_empty() {
                msg.push_str(" (no servers configured)");
            } else {
                let hints = crate::tools::suggest::find_similar(name, &names, 3);
                if hints.is_empty() {
                    msg.push_str(&format!(" (configured: {})", names.join(", ")));
                } else {
                    msg.push_str(&format!(", did you mean {}?", hints.join(", ")));
                }
            }
            McpxError::Client(msg)
        })
    }
}

fn parse_config(text: &str) -> serde_json::Result<McpConfig> {
    serde_json::from_str(text)
}

/// Find a config file by walking up the directory tree, then checking the
/// global config directory (`~/.config/mcpx/`).
fn find_config_file(filename: &str) -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let candidate = current.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_path = config_dir.join("mcpx").join(filename);
        if global_path.exists() {
            return Some(global_path);
        }
    }

    None
}

/// Runtime knobs, read from the environment once per process.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Shared total budget for one user operation (MCP_TIMEOUT, seconds).
    pub timeout: Duration,
    /// Fan-out ceiling for the concurrency runner (MCP_CONCURRENCY).
    pub concurrency: usize,
    /// Connection retry attempts (MCP_MAX_RETRIES).
    pub max_retries: u32,
    /// Base retry delay (MCP_RETRY_DELAY, milliseconds).
    pub retry_delay: Duration,
    /// Daemon socket path (MCP_DAEMON_SOCKET).
    pub socket_path: PathBuf,
    /// Pooled-session idle timeout (MCP_DAEMON_IDLE_MS).
    pub idle_timeout: Duration,
    /// Force debug logging (MCP_DEBUG).
    pub debug: bool,
}

pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;
pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 300_000;

impl Settings {
    pub fn from_env() -> Self {
        Self {
            timeout: Duration::from_secs(parse_positive("MCP_TIMEOUT", DEFAULT_TIMEOUT_SECS)),
            concurrency: parse_positive("MCP_CONCURRENCY", DEFAULT_CONCURRENCY as u64) as usize,
            max_retries: std::env::var("MCP_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: Duration::from_millis(parse_positive(
                "MCP_RETRY_DELAY",
                DEFAULT_RETRY_DELAY_MS,
            )),
            socket_path: socket_path_from_env(),
            idle_timeout: Duration::from_millis(parse_positive(
                "MCP_DAEMON_IDLE_MS",
                DEFAULT_IDLE_TIMEOUT_MS,
            )),
            debug: env_truthy("MCP_DEBUG"),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            socket_path: default_socket_path(),
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS),
            debug: false,
        }
    }
}

/// Parse a numeric env var; non-numeric, zero, or negative values fall
/// back to the default.
fn parse_positive(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(value) => match value.trim().parse::<i64>() {
            Ok(n) if n > 0 => n as u64,
            _ => default,
        },
        Err(_) => default,
    }
}

fn env_truthy(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => !matches!(value.trim(), "" | "0" | "false"),
        Err(_) => false,
    }
}

fn socket_path_from_env() -> PathBuf {
    match std::env::var("MCP_DAEMON_SOCKET") {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => default_socket_path(),
    }
}

/// Default daemon socket path: `~/.mcp-cli/daemon.sock`.
pub fn default_socket_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".mcp-cli")
        .join("daemon.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stdio_json(extra: &str) -> String {
        format!(r#"{{"command": "echo-mcp", "args": ["--fast"]{extra}}}"#)
    }

    #[test]
    fn test_parse_stdio_server() {
        let config: ServerConfig = serde_json::from_str(&stdio_json("")).unwrap();
        match &config.transport {
            Transport::Stdio { command, args, .. } => {
                assert_eq!(command, "echo-mcp");
                assert_eq!(args, &vec!["--fast".to_string()]);
            }
            other => panic!("expected stdio, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_http_server() {
        let config: ServerConfig = serde_json::from_str(
            r#"{"url": "https://mcp.example.com/mcp", "headers": {"Authorization": "Bearer x"}}"#,
        )
        .unwrap();
        match &config.transport {
            Transport::Http { url, headers, .. } => {
                assert_eq!(url, "https://mcp.example.com/mcp");
                assert_eq!(headers.get("Authorization").unwrap(), "Bearer x");
            }
            other => panic!("expected http, got {other:?}"),
        }
    }

    #[test]
    fn test_reject_command_and_url() {
        let result: Result<ServerConfig, _> =
            serde_json::from_str(r#"{"command": "x", "url": "https://y"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_reject_neither_command_nor_url() {
        let result: Result<ServerConfig, _> = serde_json::from_str(r#"{"args": ["x"]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_reject_include_and_allowed_aliases() {
        let result: Result<ServerConfig, _> = serde_json::from_str(
            r#"{"command": "x", "includeTools": ["a"], "allowedTools": ["b"]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_allowed_tools_is_alias_for_include() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"command": "x", "allowedTools": ["nav*"]}"#).unwrap();
        assert_eq!(config.filters.include, Some(vec!["nav*".to_string()]));
    }

    #[test]
    fn test_config_hash_ignores_key_order() {
        let a: ServerConfig = serde_json::from_str(
            r#"{"command": "x", "env": {"A": "1", "B": "2"}, "args": ["y"]}"#,
        )
        .unwrap();
        let b: ServerConfig = serde_json::from_str(
            r#"{"args": ["y"], "env": {"B": "2", "A": "1"}, "command": "x"}"#,
        )
        .unwrap();
        assert_eq!(config_hash(&a), config_hash(&b));
    }

    #[test]
    fn test_config_hash_differs_on_content() {
        let a: ServerConfig = serde_json::from_str(&stdio_json("")).unwrap();
        let b: ServerConfig =
            serde_json::from_str(r#"{"command": "echo-mcp", "args": ["--slow"]}"#).unwrap();
        assert_ne!(config_hash(&a), config_hash(&b));
    }

    #[test]
    fn test_config_hash_is_long_enough() {
        let config: ServerConfig = serde_json::from_str(&stdio_json("")).unwrap();
        let hash = config_hash(&config);
        assert!(hash.len() >= 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_inline_config_load() {
        let loaded =
            LoadedConfig::load(Some(r#"{"mcpServers": {"fs": {"command": "echo-mcp"}}}"#))
                .unwrap();
        assert_eq!(loaded.source, SOURCE_INLINE);
        assert!(loaded.config.mcp_servers.contains_key("fs"));
    }

    #[test]
    fn test_unknown_server_suggests_close_name() {
        let loaded = LoadedConfig::load(Some(
            r#"{"mcpServers": {"browser": {"command": "browse-mcp"}}}"#,
        ))
        .unwrap();
        let err = loaded.server("browsr").unwrap_err();
        assert!(err.to_string().contains("browser"));
    }

    #[test]
    fn test_settings_concurrency_rejects_garbage() {
        assert_eq!(parse_positive("MCPX_TEST_UNSET_VAR", 5), 5);
        std::env::set_var("MCPX_TEST_CONC_ZERO", "0");
        assert_eq!(parse_positive("MCPX_TEST_CONC_ZERO", 5), 5);
        std::env::set_var("MCPX_TEST_CONC_NEG", "-3");
        assert_eq!(parse_positive("MCPX_TEST_CONC_NEG", 5), 5);
        std::env::set_var("MCPX_TEST_CONC_NAN", "lots");
        assert_eq!(parse_positive("MCPX_TEST_CONC_NAN", 5), 5);
        std::env::set_var("MCPX_TEST_CONC_OK", "8");
        assert_eq!(parse_positive("MCPX_TEST_CONC_OK", 5), 8);
    }

    #[test]
    fn test_server_config_roundtrip() {
        let original: ServerConfig = serde_json::from_str(
            r#"{"command": "x", "args": ["a"], "env": {"K": "v"}, "disabledTools": ["bad*"]}"#,
        )
        .unwrap();
        let text = serde_json::to_string(&original).unwrap();
        let reparsed: ServerConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(original, reparsed);
    }
}
