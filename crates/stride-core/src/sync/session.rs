//! Mutual exclusion for sync cycles.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Proof that the holder is the only running sync cycle.
///
/// Released when dropped, on every exit path.
#[derive(Debug)]
pub struct SyncSession {
    _guard: OwnedMutexGuard<()>,
}

impl SyncSession {
    /// Take the session without waiting. `None` means a cycle is running.
    pub fn try_acquire(lock: &Arc<Mutex<()>>) -> Option<Self> {
        Arc::clone(lock)
            .try_lock_owned()
            .ok()
            .map(|guard| Self { _guard: guard })
    }

    pub fn is_active(lock: &Arc<Mutex<()>>) -> bool {
        lock.try_lock().is_err()
    }
}
