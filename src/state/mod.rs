//! # World State
//!
//! Flat, string-keyed store of typed values that the planner, the goal
//! manager, and the execution loop all read from. Keys are dotted paths
//! (`character_status.hp`, `combat_context.status`); nested views are
//! materialized on demand by splitting on `.`.
//!
//! The store itself does no I/O beyond explicit YAML snapshots. A single
//! mutex guards the live map; every read that leaves the store is a value
//! snapshot, never a reference.

mod store;
mod value;

pub mod params;

pub use store::{apply_effects, diff, matches, StateStore, WorldState};
pub use value::{condition_met, StateValue};

use thiserror::Error;

/// State store error types
#[derive(Debug, Error)]
pub enum StateError {
    /// Attempted direct write to a derived predicate
    #[error("key '{0}' is derived and cannot be written directly")]
    DerivedKey(String),

    /// Snapshot persistence failure
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot serialization failure
    #[error("snapshot format error: {0}")]
    Format(#[from] serde_yaml::Error),
}
