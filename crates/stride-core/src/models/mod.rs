//! Data models for Stride

mod activity;
mod mutation;
mod settings;
mod sync_conflict;

pub use activity::{
    extract_tags, Activity, ActivityFilter, ActivityId, ActivityKind, ActivityMetrics,
    ActivityPatch, NewActivity, RemoteId, RoutePoint, SyncStatus,
};
pub use mutation::{MutationEntry, MutationOp, NewMutation, MAX_RETRIES};
pub use settings::{SyncSettings, DEFAULT_AUTO_SYNC_INTERVAL_MINUTES};
pub use sync_conflict::{SyncConflict, REMOTE_WINS_STRATEGY};
