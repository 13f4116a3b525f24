//! Persisted sync settings model

use serde::{Deserialize, Serialize};

/// Default auto-sync period in minutes
pub const DEFAULT_AUTO_SYNC_INTERVAL_MINUTES: u32 = 15;

/// Sync settings shared by the orchestrator and the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Completion time of the last successful cycle (Unix ms)
    pub last_sync_at: Option<i64>,
    /// Largest server `last_modified` applied locally; the next pull starts after it
    pub pull_cursor: Option<i64>,
    /// Whether periodic sync should run
    pub auto_sync_enabled: bool,
    /// Period between automatic cycles
    pub auto_sync_interval_minutes: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            last_sync_at: None,
            pull_cursor: None,
            auto_sync_enabled: false,
            auto_sync_interval_minutes: DEFAULT_AUTO_SYNC_INTERVAL_MINUTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default() {
        let settings = SyncSettings::default();
        assert_eq!(settings.last_sync_at, None);
        assert_eq!(settings.pull_cursor, None);
        assert!(!settings.auto_sync_enabled);
        assert_eq!(settings.auto_sync_interval_minutes, 15);
    }
}
