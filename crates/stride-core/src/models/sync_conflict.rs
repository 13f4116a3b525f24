//! Sync conflict model

use serde::{Deserialize, Serialize};

/// Strategy recorded for conflicts resolved in favour of the authoritative store
pub const REMOTE_WINS_STRATEGY: &str = "remote_wins";

/// Conflict detected during reconciliation and resolved by strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Local activity involved in the conflict
    pub activity_id: String,
    /// Authoritative identifier of the activity
    pub remote_id: String,
    /// Local record's timestamp when the conflict was detected
    pub local_last_modified: i64,
    /// Incoming record's timestamp that replaced the local edit
    pub remote_last_modified: i64,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
    /// Resolution strategy name
    pub strategy: String,
}
