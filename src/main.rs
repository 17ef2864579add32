use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mcpx::cli::{Cli, Commands, DaemonCommands};
use mcpx::config::{LoadedConfig, Settings};
use mcpx::error::{suggestion_for, McpxError};
use mcpx::handlers;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let settings = Settings::from_env();
    init_tracing(cli.verbose, settings.debug);

    if let Err(err) = run(cli, settings).await {
        eprintln!("error ({}): {err}", err.kind());
        if let Some(hint) = suggestion_for(&err.to_string()) {
            eprintln!("hint: {hint}");
        }
        std::process::exit(err.exit_code());
    }
}

fn init_tracing(verbose: u8, debug: bool) {
    let default = if debug {
        "mcpx=debug"
    } else {
        match verbose {
            0 => "mcpx=warn",
            1 => "mcpx=info",
            2 => "mcpx=debug",
            _ => "trace",
        }
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

async fn run(cli: Cli, settings: Settings) -> Result<(), McpxError> {
    let loaded = LoadedConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::List { server, json } => {
            handlers::list::run_list(&loaded, &settings, server, json).await
        }
        Commands::Search { pattern, json } => {
            handlers::search::run_search(&loaded, &settings, &pattern, json).await
        }
        Commands::Info { target, json } => {
            handlers::info::run_info(&loaded, &settings, &target, json).await
        }
        Commands::Call { target, args, json } => {
            handlers::call::run_call(&loaded, &settings, &target, args, json).await
        }
        Commands::Connect { server } => {
            handlers::daemon::run_connect(&loaded, &settings, &server).await
        }
        Commands::Disconnect { server } => {
            handlers::daemon::run_disconnect(&settings, &server).await
        }
        Commands::Daemon { command } => match command {
            DaemonCommands::Start => handlers::daemon::run_daemon_start(&settings).await,
            DaemonCommands::Stop { force } => {
                handlers::daemon::run_daemon_stop(&settings, force).await
            }
            DaemonCommands::Status { json } => {
                handlers::daemon::run_daemon_status(&settings, json).await
            }
            DaemonCommands::Run => handlers::daemon::run_daemon_run(&settings).await,
        },
    }
}
