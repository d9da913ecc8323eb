// ABOUTME: Entry point for the clusteradm CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use clusteradm::config::{self, Config};
use clusteradm::error::Result;
use clusteradm::output::Output;
use clusteradm::workflow::Lifecycle;
use commands::Session;
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.global.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let output = Output::new(cli.global.output);
    if let Err(e) = run(cli).await {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut output = Output::new(cli.global.output);
    let cwd = env::current_dir()?;

    match cli.command {
        Commands::Init { cluster, force } => {
            config::init_config(&cwd, cluster.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Audit { limit } => {
            let config = match &cli.global.config {
                Some(path) => Config::load(path)?,
                None => Config::discover(&cwd)?,
            };
            commands::audit(&config, limit, &output).await
        }
        command => {
            let session = Session::open(&cli.global, &command.audit_name()).await?;
            let result = match command {
                Commands::Deploy { role } => commands::deploy(&session, role, &mut output).await,
                Commands::Start { role } => {
                    commands::lifecycle(&session, role, Lifecycle::Start, &mut output).await
                }
                Commands::Stop { role } => {
                    commands::lifecycle(&session, role, Lifecycle::Stop, &mut output).await
                }
                Commands::Restart { role } => {
                    commands::lifecycle(&session, role, Lifecycle::Restart, &mut output).await
                }
                Commands::Status { role } => commands::status(&session, role, &output).await,
                Commands::Clean { role, only } => {
                    commands::clean(&session, role, &only, &mut output).await
                }
                Commands::Check => commands::check(&session, &mut output).await,
                Commands::Migrate => commands::migrate(&session, &mut output).await,
                Commands::Init { .. } | Commands::Audit { .. } => Ok(()),
            };
            session.finish(&result).await?;
            result
        }
    }
}
