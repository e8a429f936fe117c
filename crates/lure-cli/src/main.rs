//! lure - command line front end for the Lure save pipeline

mod backend;
mod cli;
mod commands;
mod config_profiles;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::backup::run_backup;
use crate::commands::common::CliContext;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::conflicts::{run_conflicts, run_resolve};
use crate::commands::draft::run_draft;
use crate::commands::queue::run_queue;
use crate::commands::save::{run_diff, run_pull, run_save};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lure=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Diff { old, new } => run_diff(&old, &new),
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
        Commands::Config { command } => run_config(command, cli.profile.as_deref(), cli.db_path),
        command => {
            let context = CliContext::resolve(cli.db_path, cli.profile.as_deref())?;
            tracing::debug!(
                "Using profile '{}' with database {}",
                context.profile,
                context.db_path.display()
            );
            run_with_context(command, &context).await
        }
    }
}

async fn run_with_context(command: Commands, context: &CliContext) -> Result<(), CliError> {
    match command {
        Commands::Save {
            file,
            offline,
            on_conflict,
        } => run_save(&file, offline, on_conflict, context).await,
        Commands::Pull {
            campaign_id,
            output,
        } => run_pull(&campaign_id, output.as_deref(), context).await,
        Commands::Queue { command } => run_queue(command, context).await,
        Commands::Draft { command } => run_draft(command, context).await,
        Commands::Backup { command } => run_backup(command, context).await,
        Commands::Conflicts { limit, json } => run_conflicts(limit, json, context).await,
        Commands::Resolve {
            campaign_id,
            resolution,
        } => run_resolve(&campaign_id, resolution, context).await,
        // Handled before a context is resolved.
        Commands::Diff { .. } | Commands::Completions { .. } | Commands::Config { .. } => Ok(()),
    }
}
