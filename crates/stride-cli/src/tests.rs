use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::CommandFactory;
use pretty_assertions::assert_eq;
use stride_core::config::ClientConfig;
use stride_core::models::{ActivityFilter, MutationOp, NewActivity};
use stride_core::{ActivityKind, SyncStatus};

use crate::cli::{AutoSyncMode, Cli, CompletionShell, EditArgs, RecordArgs};
use crate::commands::activities::{run_delete, run_edit, run_record};
use crate::commands::common::{
    build_new_activity, build_patch, format_activity_lines, format_duration,
    format_relative_time, format_sync_timestamp, open_service, parse_duration, parse_start_time,
    resolve_db_path, short_id,
};
use crate::commands::completions::run_completions;
use crate::commands::sync::{run_auto_sync, run_force_sync, run_sync};
use crate::error::CliError;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn parse_duration_accepts_clock_unit_and_minute_forms() {
    assert_eq!(parse_duration("1:05:30").unwrap(), 3930);
    assert_eq!(parse_duration("25:00").unwrap(), 1500);
    assert_eq!(parse_duration("1h20m").unwrap(), 4800);
    assert_eq!(parse_duration("90s").unwrap(), 90);
    assert_eq!(parse_duration(" 45 ").unwrap(), 2700);
}

#[test]
fn parse_duration_rejects_malformed_input() {
    for input in ["", "0", "abc", "1:75", "10x", "1h20", "1::2"] {
        assert!(
            matches!(parse_duration(input), Err(CliError::InvalidDuration(_))),
            "{input:?} should be rejected"
        );
    }
}

#[test]
fn format_duration_switches_to_hours() {
    assert_eq!(format_duration(59), "0:59");
    assert_eq!(format_duration(1500), "25:00");
    assert_eq!(format_duration(3930), "1:05:30");
}

#[test]
fn parse_start_time_accepts_rfc3339_and_short_form() {
    assert_eq!(
        parse_start_time("2024-05-01T06:30:00Z").unwrap(),
        1_714_545_000_000
    );
    assert_eq!(parse_start_time("2024-05-01 06:30").unwrap(), 1_714_545_000_000);
    assert!(matches!(
        parse_start_time("yesterday"),
        Err(CliError::InvalidTimestamp(_))
    ));
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
}

#[test]
fn format_sync_timestamp_returns_utc_label() {
    assert_eq!(format_sync_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn build_new_activity_places_explicit_start() {
    let args = RecordArgs {
        kind: "ride".to_string(),
        km: 20.5,
        duration: "1h".to_string(),
        started_at: Some("2024-05-01T06:30:00Z".to_string()),
        notes: Some("  Morning loop #commute ".to_string()),
        tags: vec!["Club".to_string()],
    };

    let activity = build_new_activity(&args).unwrap();
    assert_eq!(activity.kind, ActivityKind::Cycle);
    assert_eq!(activity.distance_meters, 20_500.0);
    assert_eq!(activity.duration_secs, 3600);
    assert_eq!(activity.start_time, 1_714_545_000_000);
    assert_eq!(activity.end_time, 1_714_545_000_000 + 3_600_000);
    assert_eq!(activity.notes.as_deref(), Some("Morning loop #commute"));
    assert_eq!(activity.tags, vec!["Club".to_string()]);
}

#[test]
fn build_new_activity_rejects_unknown_kind_and_negative_distance() {
    let args = RecordArgs {
        kind: "swim".to_string(),
        km: 1.0,
        duration: "30".to_string(),
        ..RecordArgs::default()
    };
    assert!(matches!(build_new_activity(&args), Err(CliError::Core(_))));

    let args = RecordArgs {
        kind: "run".to_string(),
        km: -1.0,
        duration: "30".to_string(),
        ..RecordArgs::default()
    };
    assert!(matches!(
        build_new_activity(&args),
        Err(CliError::InvalidDistance)
    ));
}

#[test]
fn build_patch_moves_end_time_with_duration() {
    let current = NewActivity::finished_now(ActivityKind::Run, 5000.0, 1800)
        .into_activity()
        .unwrap();
    let args = EditArgs {
        id: current.id.to_string(),
        duration: Some("40:00".to_string()),
        clear_notes: true,
        ..EditArgs::default()
    };

    let patch = build_patch(&current, &args).unwrap();
    assert_eq!(patch.duration_secs, Some(2400));
    assert_eq!(patch.end_time, Some(current.start_time + 2_400_000));
    assert_eq!(patch.notes, Some(None));
    assert_eq!(patch.kind, None);
}

#[test]
fn build_patch_requires_a_change() {
    let current = NewActivity::finished_now(ActivityKind::Walk, 1000.0, 600)
        .into_activity()
        .unwrap();
    let args = EditArgs {
        id: current.id.to_string(),
        ..EditArgs::default()
    };
    assert!(matches!(
        build_patch(&current, &args),
        Err(CliError::EmptyEdit)
    ));
}

#[test]
fn activity_lines_show_short_id_and_status() {
    let activity = NewActivity::finished_now(ActivityKind::Hike, 12_340.0, 7200)
        .into_activity()
        .unwrap();
    let lines = format_activity_lines(std::slice::from_ref(&activity));

    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with(&short_id(&activity.id.to_string())));
    assert!(lines[0].contains("12.34 km"));
    assert!(lines[0].contains("2:00:00"));
    assert!(lines[0].contains("pending"));
}

#[test]
fn resolve_db_path_prefers_flag_then_config() {
    let config = ClientConfig {
        db_path: Some(PathBuf::from("/tmp/from-env.db")),
        ..ClientConfig::default()
    };
    assert_eq!(
        resolve_db_path(Some(PathBuf::from("/tmp/flag.db")), &config),
        PathBuf::from("/tmp/flag.db")
    );
    assert_eq!(
        resolve_db_path(None, &config),
        PathBuf::from("/tmp/from-env.db")
    );
    assert!(resolve_db_path(None, &ClientConfig::default()).ends_with("stride/stride.db"));
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn record_edit_delete_flow_queues_each_change() {
    let db_path = unique_test_db_path();

    run_record(
        &RecordArgs {
            kind: "run".to_string(),
            km: 5.0,
            duration: "25:00".to_string(),
            ..RecordArgs::default()
        },
        &db_path,
    )
    .await
    .unwrap();

    let service = open_service(&db_path).await.unwrap();
    let activities = service
        .list_activities(ActivityFilter::default())
        .await
        .unwrap();
    assert_eq!(activities.len(), 1);
    let id = activities[0].id.to_string();
    drop(service);

    run_edit(
        &EditArgs {
            id: id[..8].to_string(),
            km: Some(5.2),
            ..EditArgs::default()
        },
        &db_path,
    )
    .await
    .unwrap();
    run_delete(&id, &db_path).await.unwrap();

    let service = open_service(&db_path).await.unwrap();
    assert!(service
        .list_activities(ActivityFilter::default().with_status(SyncStatus::Pending))
        .await
        .unwrap()
        .is_empty());
    let operations = service
        .list_pending_mutations()
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.operation)
        .collect::<Vec<_>>();
    assert_eq!(
        operations,
        vec![MutationOp::Create, MutationOp::Update, MutationOp::Delete]
    );
    drop(service);

    cleanup_db_files(&db_path);
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn auto_sync_setting_is_persisted() {
    let db_path = unique_test_db_path();

    run_auto_sync(AutoSyncMode::On, Some(30), &db_path)
        .await
        .unwrap();
    let service = open_service(&db_path).await.unwrap();
    let settings = service.load_sync_settings().await.unwrap();
    assert!(settings.auto_sync_enabled);
    assert_eq!(settings.auto_sync_interval_minutes, 30);
    drop(service);

    run_auto_sync(AutoSyncMode::Off, None, &db_path)
        .await
        .unwrap();
    let service = open_service(&db_path).await.unwrap();
    let settings = service.load_sync_settings().await.unwrap();
    assert!(!settings.auto_sync_enabled);
    assert_eq!(settings.auto_sync_interval_minutes, 30);
    drop(service);

    let error = run_auto_sync(AutoSyncMode::On, Some(0), &db_path)
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::InvalidInterval));
    run_auto_sync(AutoSyncMode::Status, None, &db_path)
        .await
        .unwrap();

    cleanup_db_files(&db_path);
}

#[tokio::test(flavor = "current_thread")]
async fn run_sync_requires_sync_configuration() {
    let db_path = unique_test_db_path();

    let error = run_sync(false, &db_path, &ClientConfig::default(), false)
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::SyncNotConfigured));

    cleanup_db_files(&db_path);
}

#[tokio::test(flavor = "current_thread")]
async fn force_sync_requires_confirmation() {
    let db_path = unique_test_db_path();
    let config = ClientConfig {
        api_url: Some("http://127.0.0.1:9".to_string()),
        ..ClientConfig::default()
    };

    let error = run_force_sync(false, &db_path, &config, false)
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::ConfirmationRequired));
    assert!(!db_path.exists());
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn sync_while_offline_reports_offline() {
    let db_path = unique_test_db_path();
    let config = ClientConfig {
        api_url: Some("http://127.0.0.1:9".to_string()),
        ..ClientConfig::default()
    };

    let error = run_sync(false, &db_path, &config, true)
        .await
        .unwrap_err();
    match error {
        CliError::SyncFailed { outcome, .. } => assert_eq!(outcome, "offline"),
        other => panic!("unexpected error: {other}"),
    }

    cleanup_db_files(&db_path);
}

#[test]
fn run_completions_writes_bash_script_file() {
    let output_path = std::env::temp_dir().join(format!(
        "stride-completions-{}.bash",
        unique_test_db_path()
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("test")
    ));

    run_completions(CompletionShell::Bash, Some(&output_path)).unwrap();
    let script = std::fs::read_to_string(&output_path).unwrap();
    assert!(script.contains("stride"));
    assert!(script.contains("force-sync"));

    let _ = std::fs::remove_file(output_path);
}

fn unique_test_db_path() -> PathBuf {
    static NEXT_TEST_DB_ID: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    let sequence = NEXT_TEST_DB_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("stride-cli-test-{timestamp}-{sequence}.db"))
}

fn cleanup_db_files(path: &PathBuf) {
    // On Windows, libsql can keep file handles alive briefly after drop.
    if cfg!(windows) {
        return;
    }

    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(path.with_extension("db-shm"));
    let _ = std::fs::remove_file(path.with_extension("db-wal"));
}
