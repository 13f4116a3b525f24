//! stride-core - Core library for Stride
//!
//! This crate contains the activity models, the local record store and
//! mutation queue, the authoritative-store client, and the offline-first
//! sync engine used by every Stride interface (CLI, reference server).

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod sync;
pub mod util;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
pub use models::{Activity, ActivityId, ActivityKind, RemoteId, SyncStatus};
