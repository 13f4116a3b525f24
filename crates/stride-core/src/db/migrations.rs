//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        apply(conn, 1, V1_ACTIVITIES).await?;
    }
    if version < 2 {
        apply(conn, 2, V2_MUTATION_QUEUE).await?;
    }
    if version < 3 {
        apply(conn, 3, V3_SYNC_CONFLICTS).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Version 1: activities, settings, version tracking
const V1_ACTIVITIES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS activities (
        id TEXT PRIMARY KEY,
        remote_id TEXT UNIQUE,
        kind TEXT NOT NULL,
        start_time INTEGER NOT NULL,
        end_time INTEGER NOT NULL,
        duration_secs INTEGER NOT NULL,
        distance_meters REAL NOT NULL,
        route TEXT NOT NULL DEFAULT '[]',
        pace REAL,
        speed REAL,
        elevation_gain REAL,
        notes TEXT,
        tags TEXT NOT NULL DEFAULT '[]',
        sync_status TEXT NOT NULL DEFAULT 'pending',
        last_modified INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        CHECK (sync_status <> 'synced' OR remote_id IS NOT NULL)
    )",
    "CREATE INDEX IF NOT EXISTS idx_activities_start ON activities(start_time DESC)",
    "CREATE INDEX IF NOT EXISTS idx_activities_status ON activities(sync_status)",
    "CREATE INDEX IF NOT EXISTS idx_activities_deleted ON activities(is_deleted)",
    // Settings table (local only)
    "CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
];

/// Version 2: durable mutation queue
const V2_MUTATION_QUEUE: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS mutation_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        operation TEXT NOT NULL CHECK (operation IN ('create', 'update', 'delete')),
        activity_id TEXT NOT NULL,
        remote_id TEXT,
        payload TEXT,
        enqueued_at INTEGER NOT NULL,
        retry_count INTEGER NOT NULL DEFAULT 0,
        last_attempt_at INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_mutation_queue_order ON mutation_queue(enqueued_at, id)",
    "CREATE INDEX IF NOT EXISTS idx_mutation_queue_activity ON mutation_queue(activity_id)",
];

/// Version 3: reconciliation conflict log
const V3_SYNC_CONFLICTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sync_conflicts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        activity_id TEXT NOT NULL,
        remote_id TEXT NOT NULL,
        local_last_modified INTEGER NOT NULL,
        remote_last_modified INTEGER NOT NULL,
        resolved_at INTEGER NOT NULL,
        strategy TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_activity_id ON sync_conflicts(activity_id)",
    "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_resolved_at ON sync_conflicts(resolved_at DESC)",
];

/// Apply one migration's statements and record its version, atomically
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}
