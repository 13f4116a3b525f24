use std::path::Path;
use std::time::Duration;

use stride_core::config::ClientConfig;
use stride_core::models::DEFAULT_AUTO_SYNC_INTERVAL_MINUTES;
use stride_core::sync::SyncResult;

use crate::cli::AutoSyncMode;
use crate::commands::common::{format_sync_timestamp, open_orchestrator, open_service};
use crate::error::CliError;

pub async fn run_sync(
    as_json: bool,
    db_path: &Path,
    config: &ClientConfig,
    offline: bool,
) -> Result<(), CliError> {
    let orchestrator = open_orchestrator(db_path, config, offline).await?;
    let result = orchestrator.sync().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    report_sync_result(result, as_json)
}

fn report_sync_result(result: SyncResult, quiet: bool) -> Result<(), CliError> {
    if !result.success {
        return Err(CliError::SyncFailed {
            outcome: result.outcome.to_string(),
            message: result.message,
        });
    }
    if !quiet {
        println!("Sync completed: {}", result.message);
    }
    Ok(())
}

pub async fn run_force_sync(
    confirmed: bool,
    db_path: &Path,
    config: &ClientConfig,
    offline: bool,
) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::ConfirmationRequired);
    }

    let orchestrator = open_orchestrator(db_path, config, offline).await?;
    let restored = orchestrator.force_sync().await?;
    println!("Restored {restored} activities from the server");
    Ok(())
}

/// Sync on a timer until Ctrl-C.
pub async fn run_watch(
    interval: Option<u32>,
    db_path: &Path,
    config: &ClientConfig,
    offline: bool,
) -> Result<(), CliError> {
    let orchestrator = open_orchestrator(db_path, config, offline).await?;

    let minutes = if let Some(minutes) = interval {
        if minutes == 0 {
            return Err(CliError::InvalidInterval);
        }
        orchestrator.start_auto_sync(minutes).await?;
        minutes
    } else {
        let settings = orchestrator.service().load_sync_settings().await?;
        if !orchestrator.resume_auto_sync().await? {
            orchestrator.schedule(interval_period(settings.auto_sync_interval_minutes));
        }
        settings.auto_sync_interval_minutes
    };

    println!("Syncing every {minutes} min; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    println!("Stopped");
    Ok(())
}

fn interval_period(minutes: u32) -> Duration {
    Duration::from_secs(u64::from(minutes.max(1)) * 60)
}

pub async fn run_auto_sync(
    mode: AutoSyncMode,
    interval: Option<u32>,
    db_path: &Path,
) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let mut settings = service.load_sync_settings().await?;

    match mode {
        AutoSyncMode::On => {
            let minutes = interval.unwrap_or(settings.auto_sync_interval_minutes);
            if minutes == 0 {
                return Err(CliError::InvalidInterval);
            }
            settings.auto_sync_enabled = true;
            settings.auto_sync_interval_minutes = minutes;
            service.save_sync_settings(&settings).await?;
            println!("Auto-sync enabled every {minutes} min; `stride watch` runs it");
        }
        AutoSyncMode::Off => {
            settings.auto_sync_enabled = false;
            service.save_sync_settings(&settings).await?;
            println!("Auto-sync disabled");
        }
        AutoSyncMode::Status => {
            let state = if settings.auto_sync_enabled {
                "enabled"
            } else {
                "disabled"
            };
            println!(
                "auto-sync: {state}, every {} min (default {DEFAULT_AUTO_SYNC_INTERVAL_MINUTES})",
                settings.auto_sync_interval_minutes
            );
            println!(
                "last sync: {}",
                settings
                    .last_sync_at
                    .map_or_else(|| "never".to_string(), format_sync_timestamp)
            );
            println!("pending changes: {}", service.pending_mutation_count().await?);
        }
    }
    Ok(())
}
