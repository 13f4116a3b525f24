//! Shared services used by every Stride client.

mod activity_service;

pub use activity_service::ActivityService;
pub(crate) use activity_service::RemoteApplied;
