//! Version Trail
//!
//! Entity version tracking with before/after diffs, related-object snapshots
//! and deep audit history queries.
//!
//! # Features
//!
//! - **Lifecycle hooks**: create, update and destroy captured per transaction
//! - **Precise diffs**: only changed, non-skipped attributes are recorded
//! - **Related objects**: configurable snapshots of associated data per version
//! - **Deep history**: versions of an entity and everything associated with it
//! - **Durable log**: append-only JSON-lines store replayed on startup
//!
//! # Modules
//!
//! - `types`: Core data structures (Snapshot, VersionRecord, SubjectRef, errors)
//! - `registry`: Entity type and association declarations
//! - `entities`: Read access to current entity state
//! - `policy`: Per-type tracking policies and related-object snapshots
//! - `tracking`: Transactions, change caches and the lifecycle hooks
//! - `version_store`: Append-only version log with subject index and search
//! - `audit`: History queries and record presentation
//! - `api`: Read-only HTTP API
//! - `config`: Environment configuration for the server
//! - `utils`: Utility functions (timestamps)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use version_trail::entities::{EntitySource, EntityState, MemoryEntityStore};
//! use version_trail::{EntityRegistry, Snapshot, Tracker, TrackingPolicy, VersionStore};
//!
//! let entities = Arc::new(MemoryEntityStore::new());
//! let store = Arc::new(VersionStore::in_memory());
//! let tracker = Tracker::new(
//!     Arc::new(EntityRegistry::new()),
//!     entities.clone() as Arc<dyn EntitySource>,
//!     store.clone(),
//! )
//! .with_policy(TrackingPolicy::builder("Order").skip("notes").build());
//!
//! let before = EntityState::new("Order", 7, Snapshot::from_value(json!({"status": "pending"})).unwrap());
//! let after = EntityState::new("Order", 7, Snapshot::from_value(json!({"status": "shipped"})).unwrap());
//!
//! let mut txn = tracker.begin(Some("admin".to_string()));
//! tracker.after_update(&mut txn, &before, &after);
//! let versions = tracker.commit(&mut txn).unwrap();
//! assert_eq!(versions.len(), 1);
//! ```

pub mod api;
pub mod audit;
pub mod config;
pub mod entities;
pub mod policy;
pub mod registry;
pub mod tracking;
pub mod types;
pub mod utils;
pub mod version_store;

// Re-export commonly used items at crate root
pub use audit::{ActorResolver, AuditLog, StaticActorResolver};
pub use config::TrailConfig;
pub use policy::{IncludeSpec, TrackingPolicy};
pub use registry::{AssociationDef, EntityRegistry, EntityTypeDef, FieldDef, FieldKind};
pub use tracking::{TrackingScope, Tracker, Transaction};
pub use types::{
    Snapshot, SubjectRef, TrailError, TrailResult, VersionEvent, VersionRecord,
};
pub use version_store::{VersionFilter, VersionStore, VersionStoreConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
