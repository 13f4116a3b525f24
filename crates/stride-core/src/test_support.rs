//! In-process authoritative store for engine tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::models::RemoteId;
use crate::remote::{
    ActivityPayload, ListFilter, RemoteActivity, RemoteClient, RemoteError, RemoteResult,
};
use crate::util::now_millis;

#[derive(Default)]
struct FakeState {
    records: BTreeMap<String, RemoteActivity>,
    next_id: u64,
    clock: i64,
    calls: Vec<&'static str>,
}

impl FakeState {
    fn tick(&mut self) -> i64 {
        self.clock = now_millis().max(self.clock + 1);
        self.clock
    }
}

/// Scripted remote with failure toggles and call counters.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
    pub fail_health: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_delete: AtomicBool,
    pub health_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    health_delay_ms: AtomicU64,
    page_cap: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_health_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.health_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Serve at most `cap` records per list call, whatever the caller asks for.
    pub fn set_page_cap(&self, cap: usize) {
        self.page_cap.store(cap, Ordering::SeqCst);
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Every stored record, tombstones included.
    pub fn records(&self) -> Vec<RemoteActivity> {
        self.state().records.values().cloned().collect()
    }

    pub fn live_records(&self) -> Vec<RemoteActivity> {
        self.records()
            .into_iter()
            .filter(|record| !record.is_deleted())
            .collect()
    }

    pub fn get(&self, id: &RemoteId) -> Option<RemoteActivity> {
        self.state().records.get(id.as_str()).cloned()
    }

    /// Names of the mutating calls, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    /// A record created by another device.
    pub fn seed(&self, payload: ActivityPayload) -> RemoteActivity {
        let mut state = self.state();
        Self::insert(&mut state, payload)
    }

    /// An edit made by another device.
    pub fn edit(&self, id: &RemoteId, edit: impl FnOnce(&mut RemoteActivity)) -> RemoteActivity {
        let mut state = self.state();
        let at = state.tick();
        let record = state.records.get_mut(id.as_str()).unwrap();
        edit(record);
        record.last_modified = at;
        record.clone()
    }

    /// A deletion made by another device.
    pub fn tombstone(&self, id: &RemoteId) {
        let mut state = self.state();
        let at = state.tick();
        let record = state.records.get_mut(id.as_str()).unwrap();
        record.deleted_at = Some(at);
        record.last_modified = at;
    }

    fn insert(state: &mut FakeState, payload: ActivityPayload) -> RemoteActivity {
        state.next_id += 1;
        let id = RemoteId::new(format!("srv-{}", state.next_id)).unwrap();
        let at = state.tick();
        let record = RemoteActivity::from_payload(id, payload, at);
        state
            .records
            .insert(record.id.as_str().to_string(), record.clone());
        record
    }

    fn check(flag: &AtomicBool, call: &str) -> RemoteResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(RemoteError::Api(format!("{call} rejected by fake")));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteClient for FakeRemote {
    async fn health_check(&self) -> RemoteResult<()> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.health_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_health.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("fake is down".to_string()));
        }
        Ok(())
    }

    async fn list_activities(&self, filter: &ListFilter) -> RemoteResult<Vec<RemoteActivity>> {
        Self::check(&self.fail_list, "list")?;
        let mut records = self
            .records()
            .into_iter()
            .filter(|record| filter.include_deleted || !record.is_deleted())
            .filter(|record| {
                !matches!(filter.modified_since, Some(since) if record.last_modified <= since)
            })
            .collect::<Vec<_>>();
        records.sort_by_key(|record| record.last_modified);
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        let cap = self.page_cap.load(Ordering::SeqCst);
        if cap > 0 {
            records.truncate(cap);
        }
        Ok(records)
    }

    async fn create_activity(&self, payload: &ActivityPayload) -> RemoteResult<RemoteActivity> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_create, "create")?;
        let mut state = self.state();
        state.calls.push("create");

        if let Some(client_id) = payload.client_id.as_deref() {
            let existing = state
                .records
                .values()
                .find(|record| record.client_id.as_deref() == Some(client_id))
                .cloned();
            if let Some(existing) = existing {
                return Ok(existing);
            }
        }
        Ok(Self::insert(&mut state, payload.clone()))
    }

    async fn update_activity(
        &self,
        id: &RemoteId,
        payload: &ActivityPayload,
    ) -> RemoteResult<RemoteActivity> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_update, "update")?;
        let mut state = self.state();
        state.calls.push("update");

        let at = state.tick();
        let record = state
            .records
            .get_mut(id.as_str())
            .filter(|record| !record.is_deleted())
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        let client_id = record.client_id.clone();
        *record = RemoteActivity::from_payload(id.clone(), payload.clone(), at);
        record.client_id = client_id;
        Ok(record.clone())
    }

    async fn delete_activity(&self, id: &RemoteId) -> RemoteResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_delete, "delete")?;
        let mut state = self.state();
        state.calls.push("delete");

        let at = state.tick();
        let record = state
            .records
            .get_mut(id.as_str())
            .filter(|record| !record.is_deleted())
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        record.deleted_at = Some(at);
        record.last_modified = at;
        Ok(())
    }
}
