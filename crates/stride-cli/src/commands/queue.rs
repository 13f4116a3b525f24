use std::path::Path;

use crate::commands::common::{
    format_mutation_lines, format_sync_conflict_lines, mutation_to_item, open_service,
    sync_conflict_to_item, MutationItem, SyncConflictItem,
};
use crate::error::CliError;

pub async fn run_queue(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let entries = service.list_pending_mutations().await?;

    if as_json {
        let json_items = entries
            .iter()
            .map(mutation_to_item)
            .collect::<Vec<MutationItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Nothing waiting to sync.");
        return Ok(());
    }

    for line in format_mutation_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_conflicts(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let conflicts = service.list_conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}
