//! Clap definitions for the mcpx CLI.

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mcpx")]
#[command(about = "Discover and call tools on MCP servers", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path, or inline JSON starting with '{'
    #[arg(short = 'c', long = "config", global = true, value_name = "PATH|JSON")]
    pub config: Option<String>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace). Default is warn.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List tools from configured servers
    List {
        /// Only list tools from this server
        server: Option<String>,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Search tool names with a glob pattern (e.g. "nav*" or "browser/*")
    Search {
        pattern: String,
        #[arg(long)]
        json: bool,
    },
    /// Show a tool's description and input schema (server/tool), or a
    /// server overview (server)
    Info {
        target: String,
        #[arg(long)]
        json: bool,
    },
    /// Call a tool: mcpx call server/tool '{"key": "value"}'
    Call {
        /// Target as server/tool
        target: String,
        /// Arguments as JSON (read from stdin when omitted and piped)
        args: Option<String>,
        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Open a pooled session for a server in the daemon
    Connect { server: String },
    /// Drop a server's pooled session
    Disconnect { server: String },
    /// Manage the connection daemon
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },
}

#[derive(Subcommand)]
pub enum DaemonCommands {
    /// Start the daemon in the background
    Start,
    /// Stop the daemon
    Stop {
        /// Stop even when multiple servers are still connected
        #[arg(long)]
        force: bool,
    },
    /// Show pooled servers and their idle time
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Run the daemon in the foreground (used by `daemon start`)
    #[command(hide = true)]
    Run,
}
