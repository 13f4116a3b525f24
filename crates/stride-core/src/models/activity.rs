//! Activity model

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::remote::RemoteActivity;
use crate::util::now_millis;

/// A locally-assigned identifier for an activity, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityId(Uuid);

impl ActivityId {
    /// Create a new unique activity ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ActivityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ActivityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identifier assigned by the authoritative store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    /// Wrap a server-assigned identifier. Blank identifiers are rejected.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            return Err(Error::InvalidInput(
                "Remote identifier cannot be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of tracked activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    #[default]
    Run,
    Walk,
    Hike,
    Cycle,
}

impl ActivityKind {
    pub const ALL: [Self; 4] = [Self::Run, Self::Walk, Self::Hike, Self::Cycle];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Walk => "walk",
            Self::Hike => "hike",
            Self::Cycle => "cycle",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "run" => Ok(Self::Run),
            "walk" => Ok(Self::Walk),
            "hike" => Ok(Self::Hike),
            "cycle" | "ride" | "bike" => Ok(Self::Cycle),
            other => Err(Error::InvalidInput(format!("Unknown activity kind: {other}"))),
        }
    }
}

/// Synchronization state of a local record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Local changes not yet confirmed by the authoritative store
    #[default]
    Pending,
    /// Matches the authoritative store as of the last cycle
    Synced,
    /// A queued intent was abandoned; local and remote may disagree
    Conflict,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "conflict" => Ok(Self::Conflict),
            other => Err(Error::InvalidInput(format!("Unknown sync status: {other}"))),
        }
    }
}

/// One sampled position along a route
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Sample timestamp (Unix ms)
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl RoutePoint {
    fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.latitude) || !(-180.0..=180.0).contains(&self.longitude)
        {
            return Err(Error::InvalidInput(format!(
                "Route point out of range: ({}, {})",
                self.latitude, self.longitude
            )));
        }
        Ok(())
    }
}

/// Derived metrics supplied by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ActivityMetrics {
    /// Seconds per kilometre
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace: Option<f64>,
    /// Metres per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Metres climbed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation_gain: Option<f64>,
}

/// A completed activity as stored locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Local identifier
    pub id: ActivityId,
    /// Identifier in the authoritative store, once accepted there
    pub remote_id: Option<RemoteId>,
    pub kind: ActivityKind,
    /// Start timestamp (Unix ms)
    pub start_time: i64,
    /// End timestamp (Unix ms)
    pub end_time: i64,
    pub duration_secs: i64,
    pub distance_meters: f64,
    pub route: Vec<RoutePoint>,
    pub metrics: ActivityMetrics,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub sync_status: SyncStatus,
    /// Last modification timestamp (Unix ms)
    pub last_modified: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Soft delete flag, cleared once the delete reaches the server
    pub is_deleted: bool,
}

impl Activity {
    /// Build a fresh local copy of an authoritative record.
    #[must_use]
    pub fn from_remote(remote: RemoteActivity) -> Self {
        Self {
            id: ActivityId::new(),
            remote_id: Some(remote.id),
            kind: remote.kind,
            start_time: remote.start_time,
            end_time: remote.end_time,
            duration_secs: remote.duration_secs,
            distance_meters: remote.distance_meters,
            route: remote.route,
            metrics: remote.metrics,
            notes: remote.notes,
            tags: remote.tags,
            sync_status: SyncStatus::Synced,
            last_modified: remote.last_modified,
            created_at: now_millis(),
            is_deleted: false,
        }
    }

    /// Short human label, e.g. `run 5.02 km`
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{} {:.2} km", self.kind, self.distance_meters / 1000.0)
    }
}

/// A finished activity handed over by the tracker
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewActivity {
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

impl NewActivity {
    /// Activity of `kind` covering `distance_meters` in `duration_secs`, ending now.
    #[must_use]
    pub fn finished_now(kind: ActivityKind, distance_meters: f64, duration_secs: i64) -> Self {
        let end_time = now_millis();
        Self {
            kind,
            start_time: end_time - duration_secs.max(0) * 1000,
            end_time,
            duration_secs,
            distance_meters,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_span(self.start_time, self.end_time, self.duration_secs)?;
        validate_distance(self.distance_meters)?;
        self.route.iter().try_for_each(RoutePoint::validate)
    }

    /// Convert into a pending local record
    pub fn into_activity(self) -> Result<Activity> {
        self.validate()?;
        let now = now_millis();
        let tags = merge_tags(&self.tags, self.notes.as_deref());
        Ok(Activity {
            id: ActivityId::new(),
            remote_id: None,
            kind: self.kind,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_secs: self.duration_secs,
            distance_meters: self.distance_meters,
            route: self.route,
            metrics: self.metrics,
            notes: self.notes,
            tags,
            sync_status: SyncStatus::Pending,
            last_modified: now,
            created_at: now,
            is_deleted: false,
        })
    }
}

/// A user edit; `None` leaves a field unchanged
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActivityPatch {
    pub kind: Option<ActivityKind>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub duration_secs: Option<i64>,
    pub distance_meters: Option<f64>,
    pub route: Option<Vec<RoutePoint>>,
    pub metrics: Option<ActivityMetrics>,
    /// `Some(None)` clears the notes
    pub notes: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

impl ActivityPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.duration_secs.is_none()
            && self.distance_meters.is_none()
            && self.route.is_none()
            && self.metrics.is_none()
            && self.notes.is_none()
            && self.tags.is_none()
    }

    /// Apply the patch to `activity`, validating the result.
    ///
    /// Does not touch sync attributes; the repository owns those.
    pub fn apply(&self, activity: &mut Activity) -> Result<()> {
        let mut updated = activity.clone();
        if let Some(kind) = self.kind {
            updated.kind = kind;
        }
        if let Some(start_time) = self.start_time {
            updated.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            updated.end_time = end_time;
        }
        if let Some(duration_secs) = self.duration_secs {
            updated.duration_secs = duration_secs;
        }
        if let Some(distance_meters) = self.distance_meters {
            updated.distance_meters = distance_meters;
        }
        if let Some(route) = &self.route {
            updated.route.clone_from(route);
        }
        if let Some(metrics) = self.metrics {
            updated.metrics = metrics;
        }
        if let Some(notes) = &self.notes {
            updated.notes.clone_from(notes);
        }
        if let Some(tags) = &self.tags {
            updated.tags.clone_from(tags);
        }
        if self.tags.is_some() || self.notes.is_some() {
            updated.tags = merge_tags(&updated.tags, updated.notes.as_deref());
        }

        validate_span(updated.start_time, updated.end_time, updated.duration_secs)?;
        validate_distance(updated.distance_meters)?;
        updated.route.iter().try_for_each(RoutePoint::validate)?;

        *activity = updated;
        Ok(())
    }
}

/// Query options for listing local activities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivityFilter {
    pub kind: Option<ActivityKind>,
    pub sync_status: Option<SyncStatus>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl ActivityFilter {
    #[must_use]
    pub const fn with_status(mut self, status: SyncStatus) -> Self {
        self.sync_status = Some(status);
        self
    }

    #[must_use]
    pub const fn with_kind(mut self, kind: ActivityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

fn validate_span(start_time: i64, end_time: i64, duration_secs: i64) -> Result<()> {
    if end_time < start_time {
        return Err(Error::InvalidInput(
            "Activity cannot end before it starts".to_string(),
        ));
    }
    if duration_secs < 0 {
        return Err(Error::InvalidInput(
            "Activity duration cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn validate_distance(distance_meters: f64) -> Result<()> {
    if !distance_meters.is_finite() || distance_meters < 0.0 {
        return Err(Error::InvalidInput(
            "Activity distance must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

/// Extract #tags from free-form notes
///
/// Valid tags match the pattern: `#[a-zA-Z][a-zA-Z0-9_-]*`
/// Tags are returned in lowercase, deduplicated and sorted.
///
/// # Examples
///
/// ```
/// use stride_core::models::extract_tags;
///
/// let tags = extract_tags("Hill repeats #Intervals with #club");
/// assert_eq!(tags, vec!["club".to_string(), "intervals".to_string()]);
/// ```
#[must_use]
pub fn extract_tags(text: &str) -> Vec<String> {
    let re = Regex::new(r"#([a-zA-Z][a-zA-Z0-9_-]*)").expect("Invalid regex");
    re.captures_iter(text)
        .map(|cap| cap[1].to_lowercase())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn merge_tags(explicit: &[String], notes: Option<&str>) -> Vec<String> {
    explicit
        .iter()
        .map(|tag| tag.trim().trim_start_matches('#').to_lowercase())
        .filter(|tag| !tag.is_empty())
        .chain(notes.map(extract_tags).unwrap_or_default())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_activity_id_unique() {
        let id1 = ActivityId::new();
        let id2 = ActivityId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_activity_id_parse() {
        let id = ActivityId::new();
        let parsed: ActivityId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_remote_id_rejects_blank() {
        assert!(RemoteId::new("  ").is_err());
        assert_eq!(RemoteId::new(" abc ").unwrap().as_str(), "abc");
    }

    #[test]
    fn test_kind_parse_aliases() {
        assert_eq!("Run".parse::<ActivityKind>().unwrap(), ActivityKind::Run);
        assert_eq!("bike".parse::<ActivityKind>().unwrap(), ActivityKind::Cycle);
        assert!("swim".parse::<ActivityKind>().is_err());
    }

    #[test]
    fn test_new_activity_starts_pending_without_remote_id() {
        let activity = NewActivity::finished_now(ActivityKind::Run, 3000.0, 1800)
            .into_activity()
            .unwrap();
        assert_eq!(activity.sync_status, SyncStatus::Pending);
        assert!(activity.remote_id.is_none());
        assert_eq!(activity.end_time - activity.start_time, 1_800_000);
        assert_eq!(activity.created_at, activity.last_modified);
    }

    #[test]
    fn test_new_activity_validation() {
        let mut new = NewActivity::finished_now(ActivityKind::Walk, 100.0, 60);
        new.distance_meters = -1.0;
        assert!(new.validate().is_err());

        let mut new = NewActivity::finished_now(ActivityKind::Walk, 100.0, 60);
        new.end_time = new.start_time - 1;
        assert!(new.validate().is_err());

        let mut new = NewActivity::finished_now(ActivityKind::Walk, 100.0, 60);
        new.route.push(RoutePoint {
            latitude: 91.0,
            longitude: 0.0,
            timestamp: 0,
            altitude: None,
            accuracy: None,
        });
        assert!(new.validate().is_err());
    }

    #[test]
    fn test_tags_merged_from_notes() {
        let mut new = NewActivity::finished_now(ActivityKind::Hike, 8000.0, 7200);
        new.notes = Some("Ridge loop #Trail #fog".to_string());
        new.tags = vec!["#weekend".to_string(), "trail".to_string()];
        let activity = new.into_activity().unwrap();
        assert_eq!(activity.tags, vec!["fog", "trail", "weekend"]);
    }

    #[test]
    fn test_patch_apply_and_validate() {
        let mut activity = NewActivity::finished_now(ActivityKind::Run, 5000.0, 1500)
            .into_activity()
            .unwrap();

        let patch = ActivityPatch {
            distance_meters: Some(5200.0),
            notes: Some(Some("tempo #race".to_string())),
            ..ActivityPatch::default()
        };
        patch.apply(&mut activity).unwrap();
        assert!((activity.distance_meters - 5200.0).abs() < f64::EPSILON);
        assert_eq!(activity.tags, vec!["race"]);

        let invalid = ActivityPatch {
            duration_secs: Some(-5),
            ..ActivityPatch::default()
        };
        assert!(invalid.apply(&mut activity).is_err());
        assert_eq!(activity.duration_secs, 1500);
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(ActivityPatch::default().is_empty());
        let patch = ActivityPatch {
            kind: Some(ActivityKind::Walk),
            ..ActivityPatch::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_extract_tags_invalid() {
        assert!(extract_tags("#123 #456test").is_empty());
    }
}
