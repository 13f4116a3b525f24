//! Outcome of a sync cycle.

use serde::Serialize;
use std::fmt;

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Push and pull both ran to completion
    Completed,
    /// Another cycle held the session; nothing was done
    Busy,
    /// No network; nothing was done
    Offline,
    /// The health probe failed; queue and store untouched
    Unreachable,
    /// A phase stopped early on a fetch or local store error
    Failed,
}

impl SyncOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Busy => "busy",
            Self::Offline => "offline",
            Self::Unreachable => "unreachable",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary returned by every `sync()` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub success: bool,
    pub message: String,
    pub outcome: SyncOutcome,
    pub pushed_success: usize,
    pub pushed_failed: usize,
    pub pulled_added: usize,
    pub pulled_updated: usize,
    pub pulled_conflicts: usize,
    pub pulled_deleted: usize,
}

impl SyncResult {
    /// A cycle that did no work.
    pub(crate) fn skipped(outcome: SyncOutcome, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            outcome,
            ..Self::started()
        }
    }

    /// Zeroed counters for a cycle that got past the health probe.
    pub(crate) fn started() -> Self {
        Self {
            success: false,
            message: String::new(),
            outcome: SyncOutcome::Completed,
            pushed_success: 0,
            pushed_failed: 0,
            pulled_added: 0,
            pulled_updated: 0,
            pulled_conflicts: 0,
            pulled_deleted: 0,
        }
    }

    pub(crate) fn complete(mut self) -> Self {
        self.success = true;
        self.outcome = SyncOutcome::Completed;
        self.message = self.counts_summary();
        self
    }

    pub(crate) fn fail(mut self, reason: impl fmt::Display) -> Self {
        self.success = false;
        self.outcome = SyncOutcome::Failed;
        self.message = format!("Sync failed: {reason} ({})", self.counts_summary());
        self
    }

    fn counts_summary(&self) -> String {
        format!(
            "pushed {} ({} failed), pulled {} new, {} updated, {} deleted, {} conflicts",
            self.pushed_success,
            self.pushed_failed,
            self.pulled_added,
            self.pulled_updated,
            self.pulled_deleted,
            self.pulled_conflicts
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_summarises_counts() {
        let mut result = SyncResult::started();
        result.pushed_success = 2;
        result.pulled_conflicts = 1;
        let result = result.complete();

        assert!(result.success);
        assert_eq!(result.outcome, SyncOutcome::Completed);
        assert_eq!(
            result.message,
            "pushed 2 (0 failed), pulled 0 new, 0 updated, 0 deleted, 1 conflicts"
        );
    }

    #[test]
    fn skipped_is_not_success() {
        let result = SyncResult::skipped(SyncOutcome::Busy, "busy");
        assert!(!result.success);
        assert_eq!(result.outcome, SyncOutcome::Busy);
        assert_eq!(result.pushed_success, 0);
    }
}
