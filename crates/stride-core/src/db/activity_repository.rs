//! Activity repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::{Error, Result};
use crate::models::{
    Activity, ActivityFilter, ActivityId, ActivityMetrics, ActivityPatch, RemoteId, SyncConflict,
    SyncStatus,
};
use crate::remote::RemoteActivity;
use crate::util::now_millis;

use super::nullable;
use libsql::params::Params;
use libsql::{params, Connection, Value};

const ACTIVITY_COLUMNS: &str = "id, remote_id, kind, start_time, end_time, duration_secs, \
     distance_meters, route, pace, speed, elevation_gain, notes, tags, sync_status, \
     last_modified, created_at, is_deleted";

/// Trait for local activity storage operations (async)
///
/// Reads exclude tombstoned records unless the method says otherwise.
#[allow(async_fn_in_trait)]
pub trait ActivityRepository {
    /// Insert a fully-formed record
    async fn insert(&self, activity: &Activity) -> Result<()>;

    /// Get a live record by local ID
    async fn get(&self, id: &ActivityId) -> Result<Option<Activity>>;

    /// Get a record by local ID, tombstones included
    async fn get_including_deleted(&self, id: &ActivityId) -> Result<Option<Activity>>;

    /// Get the record carrying this remote ID, tombstones included
    async fn get_by_remote_id(&self, remote_id: &RemoteId) -> Result<Option<Activity>>;

    /// List live records, most recent start first
    async fn list(&self, filter: &ActivityFilter) -> Result<Vec<Activity>>;

    /// Apply a user edit, bump `last_modified` and mark the record pending
    async fn update(&self, id: &ActivityId, patch: &ActivityPatch) -> Result<Activity>;

    /// Tombstone a record until its delete reaches the server
    async fn mark_deleted(&self, id: &ActivityId) -> Result<Activity>;

    /// Remove a record (tombstoned or not) permanently
    async fn purge(&self, id: &ActivityId) -> Result<()>;

    /// Record acceptance by the server and mark the record synced
    async fn mark_synced(
        &self,
        id: &ActivityId,
        remote_id: &RemoteId,
        last_modified: i64,
    ) -> Result<()>;

    /// Record acceptance by the server while later local edits are still queued
    async fn attach_remote_id(
        &self,
        id: &ActivityId,
        remote_id: &RemoteId,
        last_modified: i64,
    ) -> Result<()>;

    /// Overwrite a record with the authoritative version and mark it synced
    async fn update_from_remote(&self, id: &ActivityId, remote: &RemoteActivity) -> Result<()>;

    async fn set_status(&self, id: &ActivityId, status: SyncStatus) -> Result<()>;

    /// Delete every record, tombstones included
    async fn clear(&self) -> Result<u64>;
}

/// libSQL implementation of `ActivityRepository`
pub struct LibSqlActivityRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlActivityRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Full IDs of live records whose ID starts with `prefix`
    pub async fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let pattern = format!("{}%", prefix.trim());
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM activities WHERE id LIKE ? AND is_deleted = 0 ORDER BY id LIMIT ?",
                params![pattern, limit as i64],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<String>(0)?);
        }
        Ok(ids)
    }

    /// Append an entry to the conflict log
    pub async fn log_conflict(
        &self,
        activity: &Activity,
        remote: &RemoteActivity,
        strategy: &str,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_conflicts (
                    activity_id, remote_id, local_last_modified, remote_last_modified,
                    resolved_at, strategy
                ) VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    activity.id.as_str(),
                    remote.id.as_str(),
                    activity.last_modified,
                    remote.last_modified,
                    now_millis(),
                    strategy
                ],
            )
            .await?;
        Ok(())
    }

    /// List recently resolved conflicts, newest first
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, activity_id, remote_id, local_last_modified, remote_last_modified,
                        resolved_at, strategy
                 FROM sync_conflicts
                 ORDER BY resolved_at DESC, id DESC
                 LIMIT ?",
                [limit as i64],
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(SyncConflict {
                id: row.get(0)?,
                activity_id: row.get(1)?,
                remote_id: row.get(2)?,
                local_last_modified: row.get(3)?,
                remote_last_modified: row.get(4)?,
                resolved_at: row.get(5)?,
                strategy: row.get(6)?,
            });
        }
        Ok(conflicts)
    }

    async fn query_one(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Option<Activity>> {
        let mut rows = self.conn.query(sql, params).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_activity(&row)?)),
            None => Ok(None),
        }
    }

    /// Rewrite every mutable column of an existing row
    async fn write(&self, activity: &Activity) -> Result<u64> {
        let route = serde_json::to_string(&activity.route)?;
        let tags = serde_json::to_string(&activity.tags)?;
        let rows = self
            .conn
            .execute(
                "UPDATE activities SET
                    remote_id = ?, kind = ?, start_time = ?, end_time = ?, duration_secs = ?,
                    distance_meters = ?, route = ?, pace = ?, speed = ?, elevation_gain = ?,
                    notes = ?, tags = ?, sync_status = ?, last_modified = ?, is_deleted = ?
                 WHERE id = ?",
                params![
                    nullable(activity.remote_id.as_ref().map(RemoteId::as_str)),
                    activity.kind.as_str(),
                    activity.start_time,
                    activity.end_time,
                    activity.duration_secs,
                    activity.distance_meters,
                    route,
                    nullable(activity.metrics.pace),
                    nullable(activity.metrics.speed),
                    nullable(activity.metrics.elevation_gain),
                    nullable(activity.notes.as_deref()),
                    tags,
                    activity.sync_status.as_str(),
                    activity.last_modified,
                    i64::from(activity.is_deleted),
                    activity.id.as_str()
                ],
            )
            .await?;
        Ok(rows)
    }

    async fn require(&self, id: &ActivityId) -> Result<Activity> {
        self.get_including_deleted(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Parse an activity from a database row selected with `ACTIVITY_COLUMNS`
    fn parse_activity(row: &libsql::Row) -> Result<Activity> {
        let id: String = row.get(0)?;
        let remote_id: Option<String> = row.get(1)?;
        let kind: String = row.get(2)?;
        let route: String = row.get(7)?;
        let tags: String = row.get(12)?;
        let sync_status: String = row.get(13)?;

        Ok(Activity {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid activity ID in store: {id}")))?,
            remote_id: remote_id.map(RemoteId::new).transpose()?,
            kind: kind.parse()?,
            start_time: row.get(3)?,
            end_time: row.get(4)?,
            duration_secs: row.get(5)?,
            distance_meters: row.get(6)?,
            route: serde_json::from_str(&route)?,
            metrics: ActivityMetrics {
                pace: row.get(8)?,
                speed: row.get(9)?,
                elevation_gain: row.get(10)?,
            },
            notes: row.get(11)?,
            tags: serde_json::from_str(&tags)?,
            sync_status: sync_status.parse()?,
            last_modified: row.get(14)?,
            created_at: row.get(15)?,
            is_deleted: row.get::<i32>(16)? != 0,
        })
    }
}

impl ActivityRepository for LibSqlActivityRepository<'_> {
    async fn insert(&self, activity: &Activity) -> Result<()> {
        let route = serde_json::to_string(&activity.route)?;
        let tags = serde_json::to_string(&activity.tags)?;

        self.conn
            .execute(
                &format!(
                    "INSERT INTO activities ({ACTIVITY_COLUMNS})
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ),
                params![
                    activity.id.as_str(),
                    nullable(activity.remote_id.as_ref().map(RemoteId::as_str)),
                    activity.kind.as_str(),
                    activity.start_time,
                    activity.end_time,
                    activity.duration_secs,
                    activity.distance_meters,
                    route,
                    nullable(activity.metrics.pace),
                    nullable(activity.metrics.speed),
                    nullable(activity.metrics.elevation_gain),
                    nullable(activity.notes.as_deref()),
                    tags,
                    activity.sync_status.as_str(),
                    activity.last_modified,
                    activity.created_at,
                    i64::from(activity.is_deleted)
                ],
            )
            .await?;

        Ok(())
    }

    async fn get(&self, id: &ActivityId) -> Result<Option<Activity>> {
        self.query_one(
            &format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = ? AND is_deleted = 0"),
            [id.as_str()],
        )
        .await
    }

    async fn get_including_deleted(&self, id: &ActivityId) -> Result<Option<Activity>> {
        self.query_one(
            &format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = ?"),
            [id.as_str()],
        )
        .await
    }

    async fn get_by_remote_id(&self, remote_id: &RemoteId) -> Result<Option<Activity>> {
        self.query_one(
            &format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE remote_id = ?"),
            [remote_id.as_str()],
        )
        .await
    }

    async fn list(&self, filter: &ActivityFilter) -> Result<Vec<Activity>> {
        let mut sql = format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE is_deleted = 0");
        let mut values: Vec<Value> = Vec::new();

        if let Some(kind) = filter.kind {
            sql.push_str(" AND kind = ?");
            values.push(Value::from(kind.as_str()));
        }
        if let Some(status) = filter.sync_status {
            sql.push_str(" AND sync_status = ?");
            values.push(Value::from(status.as_str()));
        }
        sql.push_str(" ORDER BY start_time DESC, id DESC LIMIT ? OFFSET ?");
        values.push(Value::Integer(filter.limit.map_or(-1, |limit| limit as i64)));
        values.push(Value::Integer(filter.offset as i64));

        let mut rows = self.conn.query(&sql, Params::Positional(values)).await?;
        let mut activities = Vec::new();
        while let Some(row) = rows.next().await? {
            activities.push(Self::parse_activity(&row)?);
        }
        Ok(activities)
    }

    async fn update(&self, id: &ActivityId, patch: &ActivityPatch) -> Result<Activity> {
        let mut activity = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        patch.apply(&mut activity)?;
        activity.last_modified = now_millis().max(activity.last_modified + 1);
        activity.sync_status = SyncStatus::Pending;
        self.write(&activity).await?;

        Ok(activity)
    }

    async fn mark_deleted(&self, id: &ActivityId) -> Result<Activity> {
        let mut activity = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        activity.is_deleted = true;
        activity.sync_status = SyncStatus::Pending;
        activity.last_modified = now_millis().max(activity.last_modified + 1);
        self.write(&activity).await?;

        Ok(activity)
    }

    async fn purge(&self, id: &ActivityId) -> Result<()> {
        self.conn
            .execute("DELETE FROM activities WHERE id = ?", [id.as_str()])
            .await?;
        Ok(())
    }

    async fn mark_synced(
        &self,
        id: &ActivityId,
        remote_id: &RemoteId,
        last_modified: i64,
    ) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE activities SET remote_id = ?, last_modified = ?, sync_status = 'synced'
                 WHERE id = ?",
                params![remote_id.as_str(), last_modified, id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn attach_remote_id(
        &self,
        id: &ActivityId,
        remote_id: &RemoteId,
        last_modified: i64,
    ) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE activities SET remote_id = ?, last_modified = MAX(last_modified, ?)
                 WHERE id = ?",
                params![remote_id.as_str(), last_modified, id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn update_from_remote(&self, id: &ActivityId, remote: &RemoteActivity) -> Result<()> {
        let mut activity = self.require(id).await?;

        activity.remote_id = Some(remote.id.clone());
        activity.kind = remote.kind;
        activity.start_time = remote.start_time;
        activity.end_time = remote.end_time;
        activity.duration_secs = remote.duration_secs;
        activity.distance_meters = remote.distance_meters;
        activity.route.clone_from(&remote.route);
        activity.metrics = remote.metrics;
        activity.notes.clone_from(&remote.notes);
        activity.tags.clone_from(&remote.tags);
        activity.last_modified = remote.last_modified;
        activity.sync_status = SyncStatus::Synced;
        activity.is_deleted = false;

        self.write(&activity).await?;
        Ok(())
    }

    async fn set_status(&self, id: &ActivityId, status: SyncStatus) -> Result<()> {
        self.conn
            .execute(
                "UPDATE activities SET sync_status = ? WHERE id = ?",
                params![status.as_str(), id.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<u64> {
        Ok(self.conn.execute("DELETE FROM activities", ()).await?)
    }
}
