//! Offline-first sync engine.
//!
//! A cycle pushes the mutation queue to the authoritative store in enqueue
//! order, then pulls authoritative changes and reconciles them into the
//! local store. The authoritative copy wins every conflict.

mod connectivity;
mod orchestrator;
mod result;
mod scheduler;
mod session;

pub use connectivity::{Connectivity, NetworkStatus};
pub use orchestrator::SyncOrchestrator;
pub use result::{SyncOutcome, SyncResult};
pub use scheduler::AutoSyncScheduler;
pub use session::SyncSession;
