//! Shared activity service wrapper used across clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    begin, finish, ActivityRepository, Database, LibSqlActivityRepository, LibSqlMutationQueue,
    LibSqlSettingsRepository, MutationQueue, SettingsRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    Activity, ActivityFilter, ActivityId, ActivityPatch, MutationEntry, MutationOp, NewActivity,
    NewMutation, SyncConflict, SyncSettings, SyncStatus, MAX_RETRIES, REMOTE_WINS_STRATEGY,
};
use crate::remote::{ActivityPayload, RemoteActivity};
use crate::util::now_millis;

/// How many prefix matches are fetched when resolving a short ID
const PREFIX_MATCH_LIMIT: usize = 5;

/// Thread-safe service for record, queue and settings operations.
///
/// Every user-facing mutation writes the record and its queue entry in one
/// local transaction. The database lock is held per operation only.
#[derive(Clone)]
pub struct ActivityService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

/// What the pull phase did with one authoritative record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemoteApplied {
    Added,
    Updated,
    /// A pending local edit was overwritten
    Conflict,
    /// A local record was purged; `conflict` when it carried pending edits
    Deleted { conflict: bool },
    Unchanged,
}

impl ActivityService {
    /// Open a service over the database at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::open(&db_path).await?;
        tracing::debug!("Opened activity store at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location of the store, if any.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Store a finished activity and queue its creation.
    pub async fn record_activity(&self, new: NewActivity) -> Result<Activity> {
        let activity = new.into_activity()?;

        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let result: Result<()> = async {
            LibSqlActivityRepository::new(conn).insert(&activity).await?;
            LibSqlMutationQueue::new(conn)
                .enqueue(&NewMutation::create(
                    activity.id,
                    ActivityPayload::from(&activity),
                ))
                .await?;
            Ok(())
        }
        .await;
        finish(conn, result).await?;

        tracing::info!(activity = %activity.id, "Recorded {}", activity.summary());
        Ok(activity)
    }

    /// Apply a user edit and queue an update carrying the full new state.
    pub async fn update_activity(&self, id: &ActivityId, patch: ActivityPatch) -> Result<Activity> {
        if patch.is_empty() {
            return Err(Error::InvalidInput("Nothing to update".to_string()));
        }

        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let result: Result<Activity> = async {
            let activity = LibSqlActivityRepository::new(conn).update(id, &patch).await?;
            LibSqlMutationQueue::new(conn)
                .enqueue(&NewMutation::update(
                    activity.id,
                    activity.remote_id.clone(),
                    ActivityPayload::from(&activity),
                ))
                .await?;
            Ok(activity)
        }
        .await;
        let activity = finish(conn, result).await?;

        tracing::info!(activity = %activity.id, "Updated {}", activity.summary());
        Ok(activity)
    }

    /// Tombstone a record and queue its deletion.
    pub async fn delete_activity(&self, id: &ActivityId) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let result: Result<()> = async {
            let activity = LibSqlActivityRepository::new(conn).mark_deleted(id).await?;
            LibSqlMutationQueue::new(conn)
                .enqueue(&NewMutation::delete(activity.id, activity.remote_id))
                .await?;
            Ok(())
        }
        .await;
        finish(conn, result).await?;

        tracing::info!(activity = %id, "Deleted activity");
        Ok(())
    }

    /// Fetch a live record by ID.
    pub async fn get_activity(&self, id: &ActivityId) -> Result<Option<Activity>> {
        let db = self.db.lock().await;
        LibSqlActivityRepository::new(db.connection()).get(id).await
    }

    /// List live records, most recent first.
    pub async fn list_activities(&self, filter: ActivityFilter) -> Result<Vec<Activity>> {
        let db = self.db.lock().await;
        LibSqlActivityRepository::new(db.connection())
            .list(&filter)
            .await
    }

    /// Outstanding queue entries in push order.
    pub async fn list_pending_mutations(&self) -> Result<Vec<MutationEntry>> {
        let db = self.db.lock().await;
        LibSqlMutationQueue::new(db.connection())
            .list_pending()
            .await
    }

    /// List recently resolved sync conflicts.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        LibSqlActivityRepository::new(db.connection())
            .list_conflicts(limit)
            .await
    }

    pub async fn load_sync_settings(&self) -> Result<SyncSettings> {
        let db = self.db.lock().await;
        LibSqlSettingsRepository::new(db.connection()).load().await
    }

    pub async fn save_sync_settings(&self, settings: &SyncSettings) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSettingsRepository::new(db.connection())
            .save(settings)
            .await
    }

    /// Resolve a full ID or a unique ID prefix to a live record's ID.
    pub async fn resolve_activity_id(&self, query: &str) -> Result<ActivityId> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("Activity ID cannot be empty".to_string()));
        }

        if let Ok(id) = query.parse::<ActivityId>() {
            if self.get_activity(&id).await?.is_some() {
                return Ok(id);
            }
            return Err(Error::NotFound(query.to_string()));
        }

        let matches = {
            let db = self.db.lock().await;
            LibSqlActivityRepository::new(db.connection())
                .list_ids_by_prefix(query, PREFIX_MATCH_LIMIT)
                .await?
        };

        match matches.as_slice() {
            [] => Err(Error::NotFound(query.to_string())),
            [id] => id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid activity ID in store: {id}"))),
            _ => Err(Error::InvalidInput(format!(
                "Activity ID prefix is ambiguous: {query} ({})",
                matches.join(", ")
            ))),
        }
    }
}

/// Store operations used by the sync engine
impl ActivityService {
    /// Fetch a record by ID, tombstones included.
    pub(crate) async fn get_activity_including_deleted(
        &self,
        id: &ActivityId,
    ) -> Result<Option<Activity>> {
        let db = self.db.lock().await;
        LibSqlActivityRepository::new(db.connection())
            .get_including_deleted(id)
            .await
    }

    /// Drop an entry that can never succeed.
    pub(crate) async fn discard_mutation(&self, entry_id: i64) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlMutationQueue::new(db.connection())
            .remove(entry_id)
            .await
    }

    /// Complete a create or update the server accepted.
    ///
    /// The record stays pending while later entries for it remain queued.
    pub(crate) async fn complete_upsert(
        &self,
        entry: &MutationEntry,
        remote: &RemoteActivity,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let result: Result<()> = async {
            let activities = LibSqlActivityRepository::new(conn);
            let queue = LibSqlMutationQueue::new(conn);

            queue.remove(entry.id).await?;
            if activities
                .get_including_deleted(&entry.activity_id)
                .await?
                .is_none()
            {
                return Ok(());
            }

            if queue.has_pending_for(&entry.activity_id).await? {
                activities
                    .attach_remote_id(&entry.activity_id, &remote.id, remote.last_modified)
                    .await
            } else {
                activities
                    .mark_synced(&entry.activity_id, &remote.id, remote.last_modified)
                    .await
            }
        }
        .await;
        finish(conn, result).await
    }

    /// Complete a delete: purge the tombstone and drop the entry.
    pub(crate) async fn complete_delete(&self, entry: &MutationEntry) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let result = async {
            LibSqlMutationQueue::new(conn).remove(entry.id).await?;
            LibSqlActivityRepository::new(conn)
                .purge(&entry.activity_id)
                .await
        }
        .await;
        finish(conn, result).await
    }

    /// Record a failed attempt. Returns `true` when the entry hit the retry
    /// ceiling and was dropped.
    pub(crate) async fn record_failure(&self, entry: &MutationEntry) -> Result<bool> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let result: Result<bool> = async {
            let queue = LibSqlMutationQueue::new(conn);
            let retry_count = queue.increment_retry(entry.id).await?;
            if retry_count < MAX_RETRIES {
                return Ok(false);
            }

            queue.remove(entry.id).await?;
            if entry.operation != MutationOp::Delete {
                let activities = LibSqlActivityRepository::new(conn);
                if activities
                    .get_including_deleted(&entry.activity_id)
                    .await?
                    .is_some()
                {
                    activities
                        .set_status(&entry.activity_id, SyncStatus::Conflict)
                        .await?;
                }
            }
            Ok(true)
        }
        .await;
        finish(conn, result).await
    }

    /// Reconcile one authoritative record with the local store.
    pub(crate) async fn apply_remote(&self, remote: &RemoteActivity) -> Result<RemoteApplied> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let result = Self::apply_remote_in(conn, remote).await;
        finish(conn, result).await
    }

    async fn apply_remote_in(
        conn: &libsql::Connection,
        remote: &RemoteActivity,
    ) -> Result<RemoteApplied> {
        let activities = LibSqlActivityRepository::new(conn);
        let queue = LibSqlMutationQueue::new(conn);

        let (local, linked) = match activities.get_by_remote_id(&remote.id).await? {
            Some(local) => (Some(local), true),
            None => (Self::find_unlinked_origin(&activities, remote).await?, false),
        };

        if remote.is_deleted() {
            let Some(local) = local else {
                return Ok(RemoteApplied::Unchanged);
            };
            let conflict = local.sync_status == SyncStatus::Pending;
            if conflict {
                activities
                    .log_conflict(&local, remote, REMOTE_WINS_STRATEGY)
                    .await?;
            }
            queue.remove_for_activity(&local.id).await?;
            activities.purge(&local.id).await?;
            return Ok(RemoteApplied::Deleted { conflict });
        }

        let Some(local) = local else {
            activities
                .insert(&Activity::from_remote(remote.clone()))
                .await?;
            return Ok(RemoteApplied::Added);
        };

        if !linked {
            return Self::link_own_create(&activities, &queue, &local, remote).await;
        }

        if remote.last_modified <= local.last_modified {
            if local.remote_id.is_none() {
                activities
                    .attach_remote_id(&local.id, &remote.id, remote.last_modified)
                    .await?;
            }
            return Ok(RemoteApplied::Unchanged);
        }

        if local.sync_status == SyncStatus::Pending {
            activities
                .log_conflict(&local, remote, REMOTE_WINS_STRATEGY)
                .await?;
            activities.update_from_remote(&local.id, remote).await?;
            let discarded = queue.remove_for_activity(&local.id).await?;
            tracing::warn!(
                activity = %local.id,
                remote = %remote.id,
                discarded,
                "Authoritative copy replaced a pending local edit"
            );
            return Ok(RemoteApplied::Conflict);
        }

        activities.update_from_remote(&local.id, remote).await?;
        Ok(RemoteApplied::Updated)
    }

    /// The remote is this device's own create whose response never arrived.
    ///
    /// Only local edits made since the create can differ from what was sent,
    /// so there is nothing to resolve: queued edits keep the record pending
    /// and push against the linked id, otherwise the remote copy is adopted.
    async fn link_own_create(
        activities: &LibSqlActivityRepository<'_>,
        queue: &LibSqlMutationQueue<'_>,
        local: &Activity,
        remote: &RemoteActivity,
    ) -> Result<RemoteApplied> {
        if queue.has_pending_edits_for(&local.id).await? {
            activities
                .attach_remote_id(&local.id, &remote.id, remote.last_modified)
                .await?;
            return Ok(RemoteApplied::Unchanged);
        }

        let unchanged = ActivityPayload::from(local) == ActivityPayload::from(remote);
        activities.update_from_remote(&local.id, remote).await?;
        let acknowledged = queue.remove_for_activity(&local.id).await?;
        tracing::debug!(
            activity = %local.id,
            remote = %remote.id,
            acknowledged,
            "Linked unacknowledged create"
        );
        Ok(if unchanged {
            RemoteApplied::Unchanged
        } else {
            RemoteApplied::Updated
        })
    }

    /// A local record created from this remote's `client_id` whose create
    /// response never arrived.
    async fn find_unlinked_origin(
        activities: &LibSqlActivityRepository<'_>,
        remote: &RemoteActivity,
    ) -> Result<Option<Activity>> {
        let Some(client_id) = remote
            .client_id
            .as_deref()
            .and_then(|id| id.parse::<ActivityId>().ok())
        else {
            return Ok(None);
        };

        Ok(activities
            .get_including_deleted(&client_id)
            .await?
            .filter(|local| local.remote_id.is_none()))
    }

    /// Replace the whole local store with authoritative records.
    ///
    /// Clears the queue and every local record, tombstones included, then
    /// inserts `remotes` as synced and persists `last_sync_at`. The pull
    /// cursor moves to the newest restored record so a truncated restore is
    /// completed by the next incremental pull.
    pub(crate) async fn replace_all(&self, remotes: Vec<RemoteActivity>) -> Result<usize> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let result: Result<usize> = async {
            let activities = LibSqlActivityRepository::new(conn);
            let dropped_entries = LibSqlMutationQueue::new(conn).clear().await?;
            let dropped_records = activities.clear().await?;
            tracing::debug!(dropped_entries, dropped_records, "Cleared local store");

            let cursor = remotes.iter().map(|remote| remote.last_modified).max();
            let mut restored = 0;
            for remote in remotes.into_iter().filter(|remote| !remote.is_deleted()) {
                activities.insert(&Activity::from_remote(remote)).await?;
                restored += 1;
            }

            let settings = LibSqlSettingsRepository::new(conn);
            let mut current = settings.load().await?;
            current.last_sync_at = Some(now_millis());
            current.pull_cursor = cursor;
            settings.save(&current).await?;
            Ok(restored)
        }
        .await;
        finish(conn, result).await
    }

    /// Record a completed pull: `last_sync_at` becomes now and the cursor
    /// advances to `cursor` when one was seen.
    pub(crate) async fn finish_pull(&self, cursor: Option<i64>) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let result: Result<()> = async {
            let settings = LibSqlSettingsRepository::new(conn);
            if let Some(cursor) = cursor {
                settings.set_pull_cursor(cursor).await?;
            }
            settings.set_last_sync_at(now_millis()).await
        }
        .await;
        finish(conn, result).await
    }

    /// Number of outstanding queue entries.
    pub async fn pending_mutation_count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        LibSqlMutationQueue::new(db.connection()).count().await
    }
}

#[cfg(test)]
impl ActivityService {
    /// Remove a record behind the queue's back.
    pub(crate) async fn purge_record(&self, id: &ActivityId) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlActivityRepository::new(db.connection())
            .purge(id)
            .await
    }
}
