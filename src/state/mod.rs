//! State management module
//!
//! Tracks replication bookmarks and the stream being synced so that an
//! interrupted run can resume and incremental streams only fetch changes.
//!
//! # Overview
//!
//! - `State` - bookmarks per stream plus `currently_syncing`
//! - `StateManager` - shared handle with optional file persistence

mod manager;
mod types;

pub use manager::StateManager;
pub use types::{State, WROTE_INITIAL_ACTIVATE_VERSION};
