//! Version Store Module
//!
//! Persistence for version records:
//! - `VersionStore`: append-only log plus subject index
//! - `VersionFilter`: equality/substring search over stored records
//!
//! # Architecture
//!
//! ```text
//! Write Path (post-commit flush):
//! ┌──────────┐    ┌──────────────┐    ┌────────────────┐    ┌──────────────┐
//! │ Tracker  │───►│ assign id +  │───►│ append to      │───►│ index by     │
//! │ commit() │    │ created_at   │    │ versions.jsonl │    │ subject      │
//! └──────────┘    └──────────────┘    └────────────────┘    └──────────────┘
//!
//! Read Path (startup):
//! ┌────────────────┐    ┌──────────────────┐
//! │ versions.jsonl │───►│ rebuild subject  │───► Ready!
//! │ replay         │    │ index            │
//! └────────────────┘    └──────────────────┘
//! ```

mod filter;
mod store;

pub use filter::{VersionFilter, VersionPage};
pub use store::{VersionStore, VersionStoreConfig};
