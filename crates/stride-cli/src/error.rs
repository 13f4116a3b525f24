use std::io;

use stride_core::config::ConfigError;
use stride_core::remote::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] stride_core::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid duration '{0}'; use H:MM:SS, MM:SS, 1h20m, 45m or minutes")]
    InvalidDuration(String),
    #[error("Invalid start time '{0}'; use RFC 3339 or YYYY-MM-DD HH:MM")]
    InvalidTimestamp(String),
    #[error("Distance must be a non-negative number of kilometres")]
    InvalidDistance,
    #[error("Auto-sync interval must be at least one minute")]
    InvalidInterval,
    #[error("Nothing to change; pass at least one field to edit")]
    EmptyEdit,
    #[error("Force sync discards unsynced local changes; rerun with --yes to confirm")]
    ConfirmationRequired,
    #[error("Sync {outcome}: {message}")]
    SyncFailed { outcome: String, message: String },
    #[error("Sync is not configured. Set STRIDE_API_URL (and STRIDE_API_TOKEN if the server needs one).")]
    SyncNotConfigured,
}
