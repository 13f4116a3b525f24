pub mod activities;
pub mod common;
pub mod completions;
pub mod queue;
pub mod sync;
