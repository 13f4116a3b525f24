//! Settings repository implementation

use crate::error::Result;
use crate::models::SyncSettings;
use libsql::Connection;

const LAST_SYNC_AT: &str = "last_sync_at";
const PULL_CURSOR: &str = "pull_cursor";
const AUTO_SYNC_ENABLED: &str = "auto_sync_enabled";
const AUTO_SYNC_INTERVAL_MINUTES: &str = "auto_sync_interval_minutes";

/// Trait for settings storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SettingsRepository {
    /// Load sync settings, falling back to defaults for missing keys
    async fn load(&self) -> Result<SyncSettings>;

    /// Save sync settings to the database
    async fn save(&self, settings: &SyncSettings) -> Result<()>;

    /// Persist only the last successful sync time
    async fn set_last_sync_at(&self, at: i64) -> Result<()>;

    /// Persist only the pull cursor
    async fn set_pull_cursor(&self, cursor: i64) -> Result<()>;
}

/// libSQL implementation of `SettingsRepository`
pub struct LibSqlSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SettingsRepository for LibSqlSettingsRepository<'_> {
    async fn load(&self) -> Result<SyncSettings> {
        let mut settings = SyncSettings::default();

        if let Some(value) = self.get_setting(LAST_SYNC_AT).await? {
            settings.last_sync_at = value.parse().ok();
        }

        if let Some(value) = self.get_setting(PULL_CURSOR).await? {
            settings.pull_cursor = value.parse().ok();
        }

        if let Some(value) = self.get_setting(AUTO_SYNC_ENABLED).await? {
            settings.auto_sync_enabled = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        if let Some(value) = self.get_setting(AUTO_SYNC_INTERVAL_MINUTES).await? {
            if let Ok(minutes) = value.parse::<u32>() {
                if minutes > 0 {
                    settings.auto_sync_interval_minutes = minutes;
                }
            }
        }

        Ok(settings)
    }

    async fn save(&self, settings: &SyncSettings) -> Result<()> {
        match settings.last_sync_at {
            Some(at) => self.set_setting(LAST_SYNC_AT, &at.to_string()).await?,
            None => self.delete_setting(LAST_SYNC_AT).await?,
        }
        match settings.pull_cursor {
            Some(cursor) => self.set_setting(PULL_CURSOR, &cursor.to_string()).await?,
            None => self.delete_setting(PULL_CURSOR).await?,
        }
        self.set_setting(
            AUTO_SYNC_ENABLED,
            if settings.auto_sync_enabled {
                "true"
            } else {
                "false"
            },
        )
        .await?;
        self.set_setting(
            AUTO_SYNC_INTERVAL_MINUTES,
            &settings.auto_sync_interval_minutes.to_string(),
        )
        .await?;
        Ok(())
    }

    async fn set_last_sync_at(&self, at: i64) -> Result<()> {
        self.set_setting(LAST_SYNC_AT, &at.to_string()).await
    }

    async fn set_pull_cursor(&self, cursor: i64) -> Result<()> {
        self.set_setting(PULL_CURSOR, &cursor.to_string()).await
    }
}

impl LibSqlSettingsRepository<'_> {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM settings WHERE key = ?", [key])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }

    async fn delete_setting(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?", [key])
            .await?;
        Ok(())
    }
}
