//! Push/pull sync cycles against the authoritative store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::models::{ActivityId, MutationEntry, MutationOp};
use crate::remote::{ActivityPayload, ListFilter, RemoteClient, RemoteError};
use crate::services::{ActivityService, RemoteApplied};

use super::connectivity::Connectivity;
use super::result::{SyncOutcome, SyncResult};
use super::scheduler::AutoSyncScheduler;
use super::session::SyncSession;

/// What happened to one queue entry during push
enum PushStep {
    Pushed,
    /// The referenced record is gone; the entry can never succeed
    Orphaned,
    /// Remote rejection or transport failure; retried next cycle
    Failed(String),
}

struct SyncEngine {
    service: ActivityService,
    remote: Arc<dyn RemoteClient>,
    connectivity: Arc<dyn Connectivity>,
    session: Arc<Mutex<()>>,
    pull_page_size: usize,
    force_sync_limit: usize,
}

/// Coordinates sync cycles for one local store.
///
/// Clones share the same session and scheduler, so at most one cycle runs
/// per store regardless of which clone triggers it.
#[derive(Clone)]
pub struct SyncOrchestrator {
    engine: Arc<SyncEngine>,
    scheduler: Arc<StdMutex<AutoSyncScheduler>>,
}

impl SyncOrchestrator {
    pub fn new(
        service: ActivityService,
        remote: Arc<dyn RemoteClient>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        let defaults = ClientConfig::default();
        Self {
            engine: Arc::new(SyncEngine {
                service,
                remote,
                connectivity,
                session: Arc::new(Mutex::new(())),
                pull_page_size: defaults.pull_page_size,
                force_sync_limit: defaults.force_sync_limit,
            }),
            scheduler: Arc::new(StdMutex::new(AutoSyncScheduler::new())),
        }
    }

    /// Build an orchestrator sized by `config`.
    pub fn from_config(
        service: ActivityService,
        remote: Arc<dyn RemoteClient>,
        connectivity: Arc<dyn Connectivity>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            engine: Arc::new(SyncEngine {
                service,
                remote,
                connectivity,
                session: Arc::new(Mutex::new(())),
                pull_page_size: config.pull_page_size.max(1),
                force_sync_limit: config.force_sync_limit.max(1),
            }),
            scheduler: Arc::new(StdMutex::new(AutoSyncScheduler::new())),
        }
    }

    pub fn service(&self) -> &ActivityService {
        &self.engine.service
    }

    /// Run one push/pull cycle. Never fails; see [`SyncResult::outcome`].
    pub async fn sync(&self) -> SyncResult {
        self.engine.sync().await
    }

    /// Whether a cycle (or force sync) is running right now.
    pub fn is_syncing(&self) -> bool {
        SyncSession::is_active(&self.engine.session)
    }

    /// Discard all local state and rebuild it from the authoritative store.
    ///
    /// Never-synced local records and queued edits are lost. Returns the
    /// number of records restored.
    pub async fn force_sync(&self) -> Result<usize> {
        self.engine.force_sync().await
    }

    /// Sync now and then every `interval_minutes`, replacing any running
    /// schedule. The setting is persisted.
    pub async fn start_auto_sync(&self, interval_minutes: u32) -> Result<()> {
        if interval_minutes == 0 {
            return Err(Error::InvalidInput(
                "Auto-sync interval must be at least one minute".to_string(),
            ));
        }

        let mut settings = self.engine.service.load_sync_settings().await?;
        settings.auto_sync_enabled = true;
        settings.auto_sync_interval_minutes = interval_minutes;
        self.engine.service.save_sync_settings(&settings).await?;

        self.schedule(Duration::from_secs(u64::from(interval_minutes) * 60));
        Ok(())
    }

    /// Stop the running schedule and persist the disabled setting.
    pub async fn stop_auto_sync(&self) -> Result<()> {
        let was_running = self.with_scheduler(AutoSyncScheduler::stop);
        if was_running {
            tracing::info!("Auto-sync stopped");
        }

        let mut settings = self.engine.service.load_sync_settings().await?;
        settings.auto_sync_enabled = false;
        self.engine.service.save_sync_settings(&settings).await
    }

    /// Restart the schedule from persisted settings. Returns whether
    /// auto-sync is enabled.
    pub async fn resume_auto_sync(&self) -> Result<bool> {
        let settings = self.engine.service.load_sync_settings().await?;
        if !settings.auto_sync_enabled {
            return Ok(false);
        }
        self.schedule(Duration::from_secs(
            u64::from(settings.auto_sync_interval_minutes.max(1)) * 60,
        ));
        Ok(true)
    }

    pub fn is_auto_sync_running(&self) -> bool {
        self.with_scheduler(|scheduler| scheduler.is_running())
    }

    /// Start the schedule with an exact period, bypassing persisted settings.
    pub fn schedule(&self, period: Duration) {
        let engine = Arc::clone(&self.engine);
        self.with_scheduler(|scheduler| {
            scheduler.start(period, move || {
                let engine = Arc::clone(&engine);
                async move {
                    // A cycle runs on its own task so stopping the schedule
                    // never cuts a local transaction short.
                    let cycle = tokio::spawn(async move { engine.sync().await });
                    match cycle.await {
                        Ok(result) => tracing::debug!(
                            outcome = %result.outcome,
                            "Auto-sync cycle: {}",
                            result.message
                        ),
                        Err(error) => tracing::error!("Auto-sync cycle panicked: {error}"),
                    }
                }
            });
        });
    }

    fn with_scheduler<T>(&self, f: impl FnOnce(&mut AutoSyncScheduler) -> T) -> T {
        let mut scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut scheduler)
    }
}

impl SyncEngine {
    async fn sync(&self) -> SyncResult {
        let Some(_session) = SyncSession::try_acquire(&self.session) else {
            tracing::info!("Sync skipped: another cycle is running");
            return SyncResult::skipped(SyncOutcome::Busy, "A sync cycle is already running");
        };

        if !self.connectivity.is_online() {
            tracing::info!("Sync skipped: offline");
            return SyncResult::skipped(SyncOutcome::Offline, "Device is offline");
        }

        if let Err(error) = self.remote.health_check().await {
            tracing::warn!("Sync skipped: authoritative store unreachable: {error}");
            return SyncResult::skipped(
                SyncOutcome::Unreachable,
                format!("Authoritative store unreachable: {error}"),
            );
        }

        let mut result = SyncResult::started();
        if let Err(error) = self.push(&mut result).await {
            tracing::error!("Push phase failed: {error}");
            return result.fail(error);
        }
        if let Err(error) = self.pull(&mut result).await {
            tracing::error!("Pull phase failed: {error}");
            return result.fail(error);
        }

        let result = result.complete();
        tracing::info!("Sync completed: {}", result.message);
        result
    }

    async fn push(&self, result: &mut SyncResult) -> Result<()> {
        let entries = self.service.list_pending_mutations().await?;
        let mut deferred: HashSet<ActivityId> = HashSet::new();

        for entry in entries {
            if deferred.contains(&entry.activity_id) {
                tracing::debug!(
                    entry = entry.id,
                    activity = %entry.activity_id,
                    "Deferring entry behind an earlier failure"
                );
                continue;
            }

            match self.push_entry(&entry).await? {
                PushStep::Pushed => {
                    tracing::debug!(
                        entry = entry.id,
                        operation = %entry.operation,
                        activity = %entry.activity_id,
                        "Pushed mutation"
                    );
                    result.pushed_success += 1;
                }
                PushStep::Orphaned => {
                    tracing::error!(
                        entry = entry.id,
                        operation = %entry.operation,
                        activity = %entry.activity_id,
                        "Dropping mutation for a missing activity"
                    );
                    self.service.discard_mutation(entry.id).await?;
                    result.pushed_failed += 1;
                }
                PushStep::Failed(reason) => {
                    result.pushed_failed += 1;
                    deferred.insert(entry.activity_id);
                    if self.service.record_failure(&entry).await? {
                        tracing::warn!(
                            entry = entry.id,
                            operation = %entry.operation,
                            activity = %entry.activity_id,
                            "Dropping mutation after {} failed attempts: {reason}",
                            entry.retry_count + 1
                        );
                    } else {
                        tracing::warn!(
                            entry = entry.id,
                            operation = %entry.operation,
                            activity = %entry.activity_id,
                            "Mutation failed, will retry: {reason}"
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Local store errors propagate; remote errors become `PushStep::Failed`.
    async fn push_entry(&self, entry: &MutationEntry) -> Result<PushStep> {
        let activity = self
            .service
            .get_activity_including_deleted(&entry.activity_id)
            .await?;

        match entry.operation {
            MutationOp::Create => {
                let Some(activity) = activity else {
                    return Ok(PushStep::Orphaned);
                };
                match self
                    .remote
                    .create_activity(&ActivityPayload::from(&activity))
                    .await
                {
                    Ok(created) => {
                        self.service.complete_upsert(entry, &created).await?;
                        Ok(PushStep::Pushed)
                    }
                    Err(error) => Ok(PushStep::Failed(error.to_string())),
                }
            }
            MutationOp::Update => {
                let Some(activity) = activity else {
                    return Ok(PushStep::Orphaned);
                };
                let Some(remote_id) = activity.remote_id.clone().or_else(|| entry.remote_id.clone())
                else {
                    return Ok(PushStep::Failed(
                        "activity has not been created remotely yet".to_string(),
                    ));
                };
                let payload = entry
                    .payload
                    .clone()
                    .unwrap_or_else(|| ActivityPayload::from(&activity));

                match self.remote.update_activity(&remote_id, &payload).await {
                    Ok(updated) => {
                        self.service.complete_upsert(entry, &updated).await?;
                        Ok(PushStep::Pushed)
                    }
                    Err(error) => Ok(PushStep::Failed(error.to_string())),
                }
            }
            MutationOp::Delete => {
                let remote_id = activity
                    .and_then(|activity| activity.remote_id)
                    .or_else(|| entry.remote_id.clone());

                if let Some(remote_id) = remote_id {
                    match self.remote.delete_activity(&remote_id).await {
                        Ok(()) => {}
                        Err(RemoteError::NotFound(_)) => {
                            tracing::debug!(remote = %remote_id, "Remote record already gone");
                        }
                        Err(error) => return Ok(PushStep::Failed(error.to_string())),
                    }
                }

                self.service.complete_delete(entry).await?;
                Ok(PushStep::Pushed)
            }
        }
    }

    /// Page through everything modified after the stored cursor. A page
    /// shorter than requested is not the end: the store may cap page sizes,
    /// so paging stops only on an empty page or a cursor that fails to move.
    async fn pull(&self, result: &mut SyncResult) -> Result<()> {
        let settings = self.service.load_sync_settings().await?;
        let include_deleted = settings.last_sync_at.is_some();
        let mut cursor = settings.pull_cursor;

        loop {
            let page = self
                .remote
                .list_activities(&ListFilter {
                    modified_since: cursor,
                    limit: Some(self.pull_page_size),
                    include_deleted,
                })
                .await?;

            for remote in &page {
                match self.service.apply_remote(remote).await? {
                    RemoteApplied::Added => result.pulled_added += 1,
                    RemoteApplied::Updated => result.pulled_updated += 1,
                    RemoteApplied::Conflict => result.pulled_conflicts += 1,
                    RemoteApplied::Deleted { conflict } => {
                        result.pulled_deleted += 1;
                        if conflict {
                            result.pulled_conflicts += 1;
                        }
                    }
                    RemoteApplied::Unchanged => {}
                }
            }

            match page.iter().map(|remote| remote.last_modified).max() {
                Some(next) if !matches!(cursor, Some(previous) if next <= previous) => {
                    cursor = Some(next);
                }
                Some(_) => {
                    tracing::warn!(?cursor, "Pull cursor did not advance; stopping");
                    break;
                }
                None => break,
            }
        }

        self.service.finish_pull(cursor).await
    }

    async fn force_sync(&self) -> Result<usize> {
        let Some(_session) = SyncSession::try_acquire(&self.session) else {
            return Err(Error::SyncInProgress);
        };
        if !self.connectivity.is_online() {
            return Err(Error::Offline);
        }

        self.remote.health_check().await?;
        let remotes = self
            .remote
            .list_activities(&ListFilter {
                modified_since: None,
                limit: Some(self.force_sync_limit),
                include_deleted: false,
            })
            .await?;

        let restored = self.service.replace_all(remotes).await?;
        tracing::warn!(restored, "Force sync replaced the local store");
        Ok(restored)
    }
}
