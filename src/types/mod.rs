//! Data types for version tracking
//!
//! This module contains the core data structures shared by the tracker,
//! the version store and the query surface.

mod error;
mod event;
mod materialize;
pub(crate) mod snapshot;
mod subject;
mod version;

pub use error::TrailError;
pub use event::{EventSet, VersionEvent};
pub use materialize::{Materialized, TypedValue, GENERIC_TYPE_NAME};
pub use snapshot::Snapshot;
pub use subject::{EntityId, SubjectRef};
pub use version::{NewVersion, StoredSnapshot, VersionRecord, IGNORED_CHANGE_KEYS};

/// Result type for tracking and query operations
pub type TrailResult<T> = Result<T, TrailError>;
