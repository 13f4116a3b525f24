//! stride - record activities offline and sync them with a Stride server

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use stride_core::config::ClientConfig;

use crate::cli::{Cli, Commands};
use crate::commands::activities::{run_delete, run_edit, run_list, run_record, run_show};
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::queue::{run_conflicts, run_queue};
use crate::commands::sync::{run_auto_sync, run_force_sync, run_sync, run_watch};
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
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stride=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;
    let db_path = resolve_db_path(cli.db_path, &config);
    let offline = cli.offline;

    match cli.command {
        Commands::Record(args) => run_record(&args, &db_path).await?,
        Commands::List {
            limit,
            status,
            kind,
            json,
        } => {
            run_list(limit, status.as_deref(), kind.as_deref(), json, &db_path).await?;
        }
        Commands::Show { id, json } => run_show(&id, json, &db_path).await?,
        Commands::Edit(args) => run_edit(&args, &db_path).await?,
        Commands::Delete { id } => run_delete(&id, &db_path).await?,
        Commands::Queue { json } => run_queue(json, &db_path).await?,
        Commands::Conflicts { limit, json } => run_conflicts(limit, json, &db_path).await?,
        Commands::Sync { json } => run_sync(json, &db_path, &config, offline).await?,
        Commands::ForceSync { yes } => run_force_sync(yes, &db_path, &config, offline).await?,
        Commands::Watch { interval } => run_watch(interval, &db_path, &config, offline).await?,
        Commands::AutoSync { mode, interval } => run_auto_sync(mode, interval, &db_path).await?,
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
