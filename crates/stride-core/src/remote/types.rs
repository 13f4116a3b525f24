//! Records as they cross the authoritative-store boundary.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Activity, ActivityKind, ActivityMetrics, RemoteId, RoutePoint};

/// Activity data sent to the authoritative store on create and update.
///
/// Carries no client-only state (sync status, tombstone flag, local
/// modification time); the server owns `last_modified`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityPayload {
    /// Local identifier of the originating record, used to dedupe retried creates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub kind: ActivityKind,
    pub start_time: i64,
    pub end_time: i64,
    pub duration_secs: i64,
    pub distance_meters: f64,
    #[serde(default)]
    pub route: Vec<RoutePoint>,
    #[serde(default)]
    pub metrics: ActivityMetrics,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ActivityPayload {
    /// Structural checks shared by client and server.
    pub fn validate(&self) -> Result<()> {
        if self.end_time < self.start_time {
            return Err(Error::InvalidInput(
                "end_time must not precede start_time".to_string(),
            ));
        }
        if self.duration_secs < 0 {
            return Err(Error::InvalidInput(
                "duration_secs must be non-negative".to_string(),
            ));
        }
        if !self.distance_meters.is_finite() || self.distance_meters < 0.0 {
            return Err(Error::InvalidInput(
                "distance_meters must be a non-negative number".to_string(),
            ));
        }
        let out_of_range = self.route.iter().any(|point| {
            !(-90.0..=90.0).contains(&point.latitude)
                || !(-180.0..=180.0).contains(&point.longitude)
        });
        if out_of_range {
            return Err(Error::InvalidInput(
                "route contains coordinates out of range".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<&Activity> for ActivityPayload {
    fn from(activity: &Activity) -> Self {
        Self {
            client_id: Some(activity.id.as_str()),
            kind: activity.kind,
            start_time: activity.start_time,
            end_time: activity.end_time,
            duration_secs: activity.duration_secs,
            distance_meters: activity.distance_meters,
            route: activity.route.clone(),
            metrics: activity.metrics,
            notes: activity.notes.clone(),
            tags: activity.tags.clone(),
        }
    }
}

impl From<&RemoteActivity> for ActivityPayload {
    fn from(remote: &RemoteActivity) -> Self {
        Self {
            client_id: remote.client_id.clone(),
            kind: remote.kind,
            start_time: remote.start_time,
            end_time: remote.end_time,
            duration_secs: remote.duration_secs,
            distance_meters: remote.distance_meters,
            route: remote.route.clone(),
            metrics: remote.metrics,
            notes: remote.notes.clone(),
            tags: remote.tags.clone(),
        }
    }
}

/// An activity as held by the authoritative store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteActivity {
    pub id: RemoteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub kind: ActivityKind,
    pub start_time: i64,
    pub end_time: i64,
    pub duration_secs: i64,
    pub distance_meters: f64,
    #[serde(default)]
    pub route: Vec<RoutePoint>,
    #[serde(default)]
    pub metrics: ActivityMetrics,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Server-side modification time (Unix ms)
    pub last_modified: i64,
    /// Set when the record was deleted on the server (Unix ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

impl RemoteActivity {
    /// Materialise a stored record from an accepted payload.
    #[must_use]
    pub fn from_payload(id: RemoteId, payload: ActivityPayload, last_modified: i64) -> Self {
        Self {
            id,
            client_id: payload.client_id,
            kind: payload.kind,
            start_time: payload.start_time,
            end_time: payload.end_time,
            duration_secs: payload.duration_secs,
            distance_meters: payload.distance_meters,
            route: payload.route,
            metrics: payload.metrics,
            notes: payload.notes,
            tags: payload.tags,
            last_modified,
            deleted_at: None,
        }
    }

    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Response body of the list endpoint
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActivityList {
    pub activities: Vec<RemoteActivity>,
}

/// Filter for the list endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListFilter {
    /// Only records modified strictly after this time (Unix ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_since: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Include server tombstones
    #[serde(default)]
    pub include_deleted: bool,
}
