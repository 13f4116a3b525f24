use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use stride_core::config::ClientConfig;
use stride_core::models::{ActivityPatch, MutationEntry, NewActivity, SyncConflict, MAX_RETRIES};
use stride_core::remote::HttpRemoteClient;
use stride_core::services::ActivityService;
use stride_core::sync::{NetworkStatus, SyncOrchestrator};
use stride_core::util::normalize_text_option;
use stride_core::{Activity, ActivityKind};

use crate::cli::{EditArgs, RecordArgs};
use crate::error::CliError;

const SHORT_ID_LEN: usize = 13;

#[derive(Debug, Serialize)]
pub struct ActivityListItem {
    pub id: String,
    pub remote_id: Option<String>,
    pub kind: ActivityKind,
    pub start_time: i64,
    pub duration_secs: i64,
    pub distance_meters: f64,
    pub sync_status: String,
    pub last_modified: i64,
    pub relative_time: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MutationItem {
    pub id: i64,
    pub operation: String,
    pub activity_id: String,
    pub remote_id: Option<String>,
    pub enqueued_at: i64,
    pub retry_count: u32,
    pub last_attempt_at: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub activity_id: String,
    pub remote_id: String,
    pub local_last_modified: i64,
    pub remote_last_modified: i64,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub strategy: String,
}

pub async fn open_service(db_path: &Path) -> Result<ActivityService, CliError> {
    Ok(ActivityService::open_path(db_path).await?)
}

/// Wire the local store to the configured server.
pub async fn open_orchestrator(
    db_path: &Path,
    config: &ClientConfig,
    offline: bool,
) -> Result<SyncOrchestrator, CliError> {
    if !config.is_sync_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    let remote = HttpRemoteClient::from_config(config)?;
    tracing::debug!("Syncing against {}", remote.base_url());
    let service = open_service(db_path).await?;

    Ok(SyncOrchestrator::from_config(
        service,
        Arc::new(remote),
        Arc::new(NetworkStatus::new(!offline)),
        config,
    ))
}

pub fn build_new_activity(args: &RecordArgs) -> Result<NewActivity, CliError> {
    let kind = args.kind.parse::<ActivityKind>()?;
    let distance_meters = km_to_meters(args.km)?;
    let duration_secs = parse_duration(&args.duration)?;

    let mut activity = NewActivity::finished_now(kind, distance_meters, duration_secs);
    if let Some(started_at) = args.started_at.as_deref() {
        activity.start_time = parse_start_time(started_at)?;
        activity.end_time = activity.start_time + duration_secs * 1000;
    }
    activity.notes = normalize_text_option(args.notes.clone());
    activity.tags.clone_from(&args.tags);
    Ok(activity)
}

/// Translate edit flags into a patch against `current`.
pub fn build_patch(current: &Activity, args: &EditArgs) -> Result<ActivityPatch, CliError> {
    let mut patch = ActivityPatch::default();

    if let Some(kind) = args.kind.as_deref() {
        patch.kind = Some(kind.parse::<ActivityKind>()?);
    }
    if let Some(km) = args.km {
        patch.distance_meters = Some(km_to_meters(km)?);
    }
    if let Some(duration) = args.duration.as_deref() {
        let duration_secs = parse_duration(duration)?;
        patch.duration_secs = Some(duration_secs);
        patch.end_time = Some(current.start_time + duration_secs * 1000);
    }
    if args.clear_notes {
        patch.notes = Some(None);
    } else if let Some(notes) = args.notes.clone() {
        patch.notes = Some(normalize_text_option(Some(notes)));
    }
    if !args.tags.is_empty() {
        patch.tags = Some(args.tags.clone());
    }

    if patch.is_empty() {
        return Err(CliError::EmptyEdit);
    }
    Ok(patch)
}

pub fn km_to_meters(km: f64) -> Result<f64, CliError> {
    if !km.is_finite() || km < 0.0 {
        return Err(CliError::InvalidDistance);
    }
    Ok(km * 1000.0)
}

/// Parse `H:MM:SS`, `MM:SS`, unit forms like `1h20m` or `90s`, or plain minutes.
pub fn parse_duration(input: &str) -> Result<i64, CliError> {
    let text = input.trim().to_ascii_lowercase();
    let invalid = || CliError::InvalidDuration(input.trim().to_string());

    let seconds = if text.contains(':') {
        let parts = text
            .split(':')
            .map(|part| part.parse::<u32>().ok().map(i64::from))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(invalid)?;
        match parts.as_slice() {
            [minutes, seconds] if *seconds < 60 => minutes * 60 + seconds,
            [hours, minutes, seconds] if *minutes < 60 && *seconds < 60 => {
                hours * 3600 + minutes * 60 + seconds
            }
            _ => return Err(invalid()),
        }
    } else if !text.is_empty() && text.chars().all(|ch| ch.is_ascii_digit()) {
        text.parse::<u32>().map(|minutes| i64::from(minutes) * 60).map_err(|_| invalid())?
    } else {
        parse_unit_duration(&text).ok_or_else(invalid)?
    };

    if seconds <= 0 {
        return Err(invalid());
    }
    Ok(seconds)
}

fn parse_unit_duration(text: &str) -> Option<i64> {
    let mut total = 0_i64;
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let unit = match ch {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        let value = i64::from(digits.parse::<u32>().ok()?);
        total = total.checked_add(value.checked_mul(unit)?)?;
        digits.clear();
    }
    digits.is_empty().then_some(total)
}

/// Parse an RFC 3339 timestamp, or `YYYY-MM-DD HH:MM` taken as UTC.
pub fn parse_start_time(input: &str) -> Result<i64, CliError> {
    let text = input.trim();
    if let Ok(date_time) = chrono::DateTime::parse_from_rfc3339(text) {
        return Ok(date_time.timestamp_millis());
    }
    chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M")
        .map(|naive| naive.and_utc().timestamp_millis())
        .map_err(|_| CliError::InvalidTimestamp(text.to_string()))
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

pub fn format_distance(distance_meters: f64) -> String {
    format!("{:.2} km", distance_meters / 1000.0)
}

pub fn format_duration(duration_secs: i64) -> String {
    let duration_secs = duration_secs.max(0);
    let hours = duration_secs / 3600;
    let minutes = (duration_secs % 3600) / 60;
    let seconds = duration_secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

pub fn render_tags(activity: &Activity) -> String {
    activity
        .tags
        .iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn format_activity_lines(activities: &[Activity]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    activities
        .iter()
        .map(|activity| {
            let id = short_id(&activity.id.to_string());
            let kind = activity.kind.as_str();
            let distance = format_distance(activity.distance_meters);
            let duration = format_duration(activity.duration_secs);
            let status = activity.sync_status.as_str();
            let relative_time = format_relative_time(activity.start_time, now_ms);
            let tags = render_tags(activity);

            let line = format!(
                "{id:<13}  {kind:<5}  {distance:>9}  {duration:>8}  {status:<8}  {relative_time}"
            );
            if tags.is_empty() {
                line
            } else {
                format!("{line:<64}  {tags}")
            }
        })
        .collect()
}

pub fn activity_to_list_item(activity: &Activity) -> ActivityListItem {
    let now_ms = Utc::now().timestamp_millis();
    ActivityListItem {
        id: activity.id.to_string(),
        remote_id: activity.remote_id.as_ref().map(ToString::to_string),
        kind: activity.kind,
        start_time: activity.start_time,
        duration_secs: activity.duration_secs,
        distance_meters: activity.distance_meters,
        sync_status: activity.sync_status.to_string(),
        last_modified: activity.last_modified,
        relative_time: format_relative_time(activity.start_time, now_ms),
        tags: activity.tags.clone(),
    }
}

pub fn format_activity_details(activity: &Activity) -> Vec<String> {
    let mut lines = vec![
        format!("id:        {}", activity.id),
        format!(
            "remote:    {}",
            activity
                .remote_id
                .as_ref()
                .map_or_else(|| "-".to_string(), ToString::to_string)
        ),
        format!("kind:      {}", activity.kind),
        format!("started:   {}", format_sync_timestamp(activity.start_time)),
        format!("duration:  {}", format_duration(activity.duration_secs)),
        format!("distance:  {}", format_distance(activity.distance_meters)),
        format!("status:    {}", activity.sync_status),
        format!("modified:  {}", format_sync_timestamp(activity.last_modified)),
    ];
    if let Some(pace) = activity.metrics.pace {
        lines.push(format!("pace:      {}", format_pace(pace)));
    }
    if !activity.route.is_empty() {
        lines.push(format!("route:     {} points", activity.route.len()));
    }
    if let Some(notes) = activity.notes.as_deref() {
        lines.push(format!("notes:     {notes}"));
    }
    let tags = render_tags(activity);
    if !tags.is_empty() {
        lines.push(format!("tags:      {tags}"));
    }
    lines
}

#[allow(clippy::cast_possible_truncation)]
fn format_pace(seconds_per_km: f64) -> String {
    format!("{} /km", format_duration(seconds_per_km.round() as i64))
}

pub fn mutation_to_item(entry: &MutationEntry) -> MutationItem {
    MutationItem {
        id: entry.id,
        operation: entry.operation.to_string(),
        activity_id: entry.activity_id.to_string(),
        remote_id: entry.remote_id.as_ref().map(ToString::to_string),
        enqueued_at: entry.enqueued_at,
        retry_count: entry.retry_count,
        last_attempt_at: entry.last_attempt_at,
    }
}

pub fn format_mutation_lines(entries: &[MutationEntry]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    entries
        .iter()
        .map(|entry| {
            format!(
                "#{:<5} {:<6}  {:<13}  retries={}/{}  queued {}",
                entry.id,
                entry.operation,
                short_id(&entry.activity_id.to_string()),
                entry.retry_count,
                MAX_RETRIES,
                format_relative_time(entry.enqueued_at, now_ms)
            )
        })
        .collect()
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        activity_id: conflict.activity_id.clone(),
        remote_id: conflict.remote_id.clone(),
        local_last_modified: conflict.local_last_modified,
        remote_last_modified: conflict.remote_last_modified,
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_sync_timestamp(conflict.resolved_at),
        strategy: conflict.strategy.clone(),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {}  activity={}  remote={}  local={} incoming={}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.strategy,
                short_id(&conflict.activity_id),
                conflict.remote_id,
                conflict.local_last_modified,
                conflict.remote_last_modified
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// `--db-path`, then `STRIDE_DB_PATH`, then the per-user data directory.
pub fn resolve_db_path(cli_db_path: Option<PathBuf>, config: &ClientConfig) -> PathBuf {
    cli_db_path
        .or_else(|| config.db_path.clone())
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stride")
        .join("stride.db")
}
