//! Mutation queue entry model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::remote::ActivityPayload;

use super::activity::{ActivityId, RemoteId};

/// Queue entries are dropped once they have failed this many times
pub const MAX_RETRIES: u32 = 5;

/// Operation an entry asks the authoritative store to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOp {
    Create,
    Update,
    Delete,
}

impl MutationOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!(
                "Unknown mutation operation: {other}"
            ))),
        }
    }
}

/// An entry waiting to be enqueued
#[derive(Debug, Clone, PartialEq)]
pub struct NewMutation {
    pub operation: MutationOp,
    pub activity_id: ActivityId,
    pub remote_id: Option<RemoteId>,
    pub payload: Option<ActivityPayload>,
}

impl NewMutation {
    #[must_use]
    pub const fn create(activity_id: ActivityId, payload: ActivityPayload) -> Self {
        Self {
            operation: MutationOp::Create,
            activity_id,
            remote_id: None,
            payload: Some(payload),
        }
    }

    #[must_use]
    pub const fn update(
        activity_id: ActivityId,
        remote_id: Option<RemoteId>,
        payload: ActivityPayload,
    ) -> Self {
        Self {
            operation: MutationOp::Update,
            activity_id,
            remote_id,
            payload: Some(payload),
        }
    }

    #[must_use]
    pub const fn delete(activity_id: ActivityId, remote_id: Option<RemoteId>) -> Self {
        Self {
            operation: MutationOp::Delete,
            activity_id,
            remote_id,
            payload: None,
        }
    }
}

/// A persisted, outstanding intent to change the authoritative store
#[derive(Debug, Clone, PartialEq)]
pub struct MutationEntry {
    /// Queue row identifier (monotonic)
    pub id: i64,
    pub operation: MutationOp,
    pub activity_id: ActivityId,
    /// Remote identifier known when the entry was enqueued
    pub remote_id: Option<RemoteId>,
    /// Snapshot of the data to apply (create/update)
    pub payload: Option<ActivityPayload>,
    /// Enqueue timestamp (Unix ms)
    pub enqueued_at: i64,
    pub retry_count: u32,
    /// Last failed attempt (Unix ms)
    pub last_attempt_at: Option<i64>,
}

impl MutationEntry {
    /// Whether one more failure drops the entry
    #[must_use]
    pub const fn is_last_attempt(&self) -> bool {
        self.retry_count + 1 >= MAX_RETRIES
    }
}
