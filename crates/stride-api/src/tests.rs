//! End-to-end tests: the HTTP client and sync engine against a live server.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use stride_core::models::{ActivityFilter, ActivityMetrics, ActivityPatch, NewActivity};
use stride_core::remote::{
    ActivityPayload, HttpRemoteClient, ListFilter, RemoteClient, RemoteError,
};
use stride_core::services::ActivityService;
use stride_core::sync::{NetworkStatus, SyncOrchestrator};
use stride_core::{ActivityKind, SyncStatus};

use crate::config::AppConfig;
use crate::routes::{app_router, AppState};

async fn spawn_server(config: AppConfig) -> String {
    let state = AppState::from_config(Arc::new(config)).await.unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app_router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base_url: &str, token: Option<&str>) -> HttpRemoteClient {
    HttpRemoteClient::new(
        base_url,
        token.map(str::to_string),
        Duration::from_secs(5),
    )
    .unwrap()
}

async fn device(base_url: &str) -> SyncOrchestrator {
    let service = ActivityService::open_in_memory().await.unwrap();
    SyncOrchestrator::new(
        service,
        Arc::new(client(base_url, None)),
        Arc::new(NetworkStatus::new(true)),
    )
}

fn payload(client_id: &str) -> ActivityPayload {
    ActivityPayload {
        client_id: Some(client_id.to_string()),
        kind: ActivityKind::Walk,
        start_time: 1_000,
        end_time: 601_000,
        duration_secs: 600,
        distance_meters: 800.0,
        route: Vec::new(),
        metrics: ActivityMetrics::default(),
        notes: None,
        tags: Vec::new(),
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_reaches_server() {
    let base_url = spawn_server(AppConfig::default()).await;
    client(&base_url, None).health_check().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_reports_unreachable_server() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let error = client(&format!("http://{addr}"), None)
        .health_check()
        .await
        .unwrap_err();
    assert!(matches!(error, RemoteError::Unreachable(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn http_create_is_idempotent_on_client_id() {
    let base_url = spawn_server(AppConfig::default()).await;
    let remote = client(&base_url, None);

    let first = remote.create_activity(&payload("local-1")).await.unwrap();
    let second = remote.create_activity(&payload("local-1")).await.unwrap();

    assert_eq!(first, second);
    let listed = remote
        .list_activities(&ListFilter::default())
        .await
        .unwrap();
    assert_eq!(listed, vec![first]);
}

#[tokio::test(flavor = "multi_thread")]
async fn http_errors_map_to_remote_errors() {
    let base_url = spawn_server(AppConfig::default()).await;
    let remote = client(&base_url, None);

    let mut invalid = payload("bad");
    invalid.distance_meters = -5.0;
    let error = remote.create_activity(&invalid).await.unwrap_err();
    assert!(
        matches!(&error, RemoteError::Api(message) if message.contains("(400)")),
        "unexpected error: {error}"
    );

    let record = remote.create_activity(&payload("local-1")).await.unwrap();
    remote.delete_activity(&record.id).await.unwrap();
    let again = remote.delete_activity(&record.id).await.unwrap_err();
    assert!(matches!(again, RemoteError::NotFound(_)));
    let update = remote
        .update_activity(&record.id, &payload("local-1"))
        .await
        .unwrap_err();
    assert!(matches!(update, RemoteError::NotFound(_)));

    let tombstones = remote
        .list_activities(&ListFilter {
            include_deleted: true,
            ..ListFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(tombstones.len(), 1);
    assert!(tombstones[0].is_deleted());
}

#[tokio::test(flavor = "multi_thread")]
async fn api_token_guards_activity_routes() {
    let base_url = spawn_server(AppConfig {
        api_token: Some("s3cret".to_string()),
        ..AppConfig::default()
    })
    .await;

    let anonymous = client(&base_url, None);
    anonymous.health_check().await.unwrap();
    let error = anonymous
        .list_activities(&ListFilter::default())
        .await
        .unwrap_err();
    assert!(
        matches!(&error, RemoteError::Api(message) if message.contains("(401)")),
        "unexpected error: {error}"
    );

    let authorized = client(&base_url, Some("s3cret"));
    assert!(authorized
        .list_activities(&ListFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn two_devices_converge_through_the_server() {
    let base_url = spawn_server(AppConfig::default()).await;
    let phone = device(&base_url).await;
    let laptop = device(&base_url).await;

    let recorded = phone
        .service()
        .record_activity(NewActivity::finished_now(ActivityKind::Run, 5000.0, 1500))
        .await
        .unwrap();
    let result = phone.sync().await;
    assert!(result.success, "{}", result.message);
    assert_eq!(result.pushed_success, 1);
    let synced = phone
        .service()
        .get_activity(&recorded.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(synced.sync_status, SyncStatus::Synced);
    assert!(synced.remote_id.is_some());

    settle().await;
    let result = laptop.sync().await;
    assert!(result.success, "{}", result.message);
    assert_eq!(result.pulled_added, 1);
    let on_laptop = laptop
        .service()
        .list_activities(ActivityFilter::default())
        .await
        .unwrap();
    assert_eq!(on_laptop.len(), 1);
    assert_eq!(on_laptop[0].remote_id, synced.remote_id);

    settle().await;
    laptop
        .service()
        .update_activity(
            &on_laptop[0].id,
            ActivityPatch {
                distance_meters: Some(5200.0),
                ..ActivityPatch::default()
            },
        )
        .await
        .unwrap();
    let result = laptop.sync().await;
    assert_eq!(result.pushed_success, 1);

    settle().await;
    let result = phone.sync().await;
    assert!(result.success, "{}", result.message);
    assert_eq!(result.pulled_updated, 1);
    let refreshed = phone
        .service()
        .get_activity(&recorded.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.distance_meters, 5200.0);

    settle().await;
    phone.service().delete_activity(&recorded.id).await.unwrap();
    let result = phone.sync().await;
    assert_eq!(result.pushed_success, 1);

    settle().await;
    let result = laptop.sync().await;
    assert!(result.success, "{}", result.message);
    assert_eq!(result.pulled_deleted, 1);
    assert!(laptop
        .service()
        .list_activities(ActivityFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn force_sync_rebuilds_from_server() {
    let base_url = spawn_server(AppConfig::default()).await;
    let remote = client(&base_url, None);
    remote.create_activity(&payload("other-device")).await.unwrap();

    let laptop = device(&base_url).await;
    laptop
        .service()
        .record_activity(NewActivity::finished_now(ActivityKind::Hike, 9000.0, 7200))
        .await
        .unwrap();

    let restored = laptop.force_sync().await.unwrap();
    assert_eq!(restored, 1);

    let local = laptop
        .service()
        .list_activities(ActivityFilter::default())
        .await
        .unwrap();
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].kind, ActivityKind::Walk);
    assert!(laptop
        .service()
        .list_pending_mutations()
        .await
        .unwrap()
        .is_empty());
}
