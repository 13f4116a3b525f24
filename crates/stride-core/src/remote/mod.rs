//! Contract for talking to the authoritative store.

mod http;
mod types;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::RemoteId;

pub use http::HttpRemoteClient;
pub use types::{ActivityList, ActivityPayload, ListFilter, RemoteActivity};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Authoritative store unreachable: {0}")]
    Unreachable(String),
    #[error("Remote record not found: {0}")]
    NotFound(String),
    #[error("Remote API error: {0}")]
    Api(String),
    #[error("Remote HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Operations the sync engine needs from the authoritative store.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Probe the store; any error means it cannot take a sync cycle.
    async fn health_check(&self) -> RemoteResult<()>;

    /// Records ordered by `last_modified`, oldest first.
    async fn list_activities(&self, filter: &ListFilter) -> RemoteResult<Vec<RemoteActivity>>;

    /// Create a record; retrying with the same `client_id` returns the original.
    async fn create_activity(&self, payload: &ActivityPayload) -> RemoteResult<RemoteActivity>;

    async fn update_activity(
        &self,
        id: &RemoteId,
        payload: &ActivityPayload,
    ) -> RemoteResult<RemoteActivity>;

    /// Fails with [`RemoteError::NotFound`] when nothing is stored under `id`.
    async fn delete_activity(&self, id: &RemoteId) -> RemoteResult<()>;
}
