use std::path::Path;

use stride_core::models::ActivityFilter;
use stride_core::{ActivityKind, SyncStatus};

use crate::cli::{EditArgs, RecordArgs};
use crate::commands::common::{
    activity_to_list_item, build_new_activity, build_patch, format_activity_details,
    format_activity_lines, open_service, ActivityListItem,
};
use crate::error::CliError;

pub async fn run_record(args: &RecordArgs, db_path: &Path) -> Result<(), CliError> {
    let new_activity = build_new_activity(args)?;
    let service = open_service(db_path).await?;
    let activity = service.record_activity(new_activity).await?;
    println!("{}", activity.id);
    Ok(())
}

pub async fn run_list(
    limit: usize,
    status: Option<&str>,
    kind: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let mut filter = ActivityFilter::default().with_limit(limit);
    if let Some(status) = status {
        filter = filter.with_status(status.parse::<SyncStatus>()?);
    }
    if let Some(kind) = kind {
        filter = filter.with_kind(kind.parse::<ActivityKind>()?);
    }

    let service = open_service(db_path).await?;
    let activities = service.list_activities(filter).await?;

    if as_json {
        let json_items = activities
            .iter()
            .map(activity_to_list_item)
            .collect::<Vec<ActivityListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if activities.is_empty() {
        println!("No activities recorded.");
    } else {
        for line in format_activity_lines(&activities) {
            println!("{line}");
        }
    }

    Ok(())
}

pub async fn run_show(id: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let activity_id = service.resolve_activity_id(id).await?;
    let activity = service
        .get_activity(&activity_id)
        .await?
        .ok_or_else(|| stride_core::Error::NotFound(id.to_string()))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&activity)?);
    } else {
        for line in format_activity_details(&activity) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_edit(args: &EditArgs, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let activity_id = service.resolve_activity_id(&args.id).await?;
    let current = service
        .get_activity(&activity_id)
        .await?
        .ok_or_else(|| stride_core::Error::NotFound(args.id.clone()))?;

    let patch = build_patch(&current, args)?;
    let updated = service.update_activity(&activity_id, patch).await?;
    println!("{}", updated.id);
    Ok(())
}

pub async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let activity_id = service.resolve_activity_id(id).await?;
    service.delete_activity(&activity_id).await?;
    println!("{activity_id}");
    Ok(())
}
