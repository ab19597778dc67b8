//! Change Cache - per-mutation scratch state between hooks and commit

use std::fmt;

use crate::entities::EntityState;
use crate::types::{Snapshot, SubjectRef, VersionEvent};

/// Identifier of one host transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// (transaction, subject) pair a cache belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub transaction: TransactionId,
    pub subject: SubjectRef,
}

/// Lifecycle of one cache
///
/// `Idle -> Pending(event) -> Cached(event) -> Flushed | Discarded`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Idle,
    /// Event recorded, diffs not captured yet
    Pending(VersionEvent),
    /// Diffs captured
    Cached(VersionEvent),
    Flushed,
    Discarded,
}

impl CacheState {
    pub fn event(&self) -> Option<VersionEvent> {
        match self {
            CacheState::Pending(event) | CacheState::Cached(event) => Some(*event),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, CacheState::Flushed | CacheState::Discarded)
    }
}

/// Everything captured for one subject within one transaction
#[derive(Debug, Clone)]
pub struct ChangeCache {
    key: CacheKey,
    state: CacheState,
    /// Attributes before the first tracked mutation (none for creates)
    pre_image: Option<Snapshot>,
    /// Latest state seen by a hook
    current: Option<EntityState>,
    object: Option<Snapshot>,
    object_changes: Snapshot,
    additional: Option<(Snapshot, Snapshot)>,
}

impl ChangeCache {
    pub fn new(key: CacheKey) -> Self {
        Self {
            key,
            state: CacheState::Idle,
            pre_image: None,
            current: None,
            object: None,
            object_changes: Snapshot::new(),
            additional: None,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    pub fn pre_image(&self) -> Option<&Snapshot> {
        self.pre_image.as_ref()
    }

    pub fn current(&self) -> Option<&EntityState> {
        self.current.as_ref()
    }

    pub fn object(&self) -> Option<&Snapshot> {
        self.object.as_ref()
    }

    pub fn object_changes(&self) -> &Snapshot {
        &self.object_changes
    }

    /// Captured (`additional_objects`, `additional_objects_changes`)
    pub fn additional(&self) -> Option<&(Snapshot, Snapshot)> {
        self.additional.as_ref()
    }

    /// Record a lifecycle hook, merging with earlier hooks in the same transaction
    ///
    /// Returns the event the cache now stands for, or `None` when the cache
    /// is finished (including a create undone by a destroy).
    pub fn record(
        &mut self,
        event: VersionEvent,
        pre_image: Option<Snapshot>,
        state: EntityState,
    ) -> Option<VersionEvent> {
        use VersionEvent::*;

        let merged = match (self.state.event(), event) {
            (None, _) if self.state.is_finished() => return None,
            (None, event) => {
                self.pre_image = pre_image;
                event
            }
            // Created in this transaction: later saves fold into the create
            (Some(Create), Update) => Create,
            (Some(Create), Destroy) => {
                self.discard();
                return None;
            }
            (Some(Update), Update) => Update,
            (Some(Update), Destroy) => {
                self.pre_image = pre_image;
                Destroy
            }
            (Some(current), _) => current,
        };

        self.current = Some(state);
        self.state = CacheState::Pending(merged);
        Some(merged)
    }

    /// Store the entity's own diff
    pub fn cache_object(&mut self, object: Option<Snapshot>, changes: Snapshot) {
        self.object = object;
        self.object_changes = changes;
        if let CacheState::Pending(event) = self.state {
            self.state = CacheState::Cached(event);
        }
    }

    /// Store the related-object snapshot and its diff
    pub fn cache_additional(&mut self, objects: Snapshot, changes: Snapshot) {
        self.additional = Some((objects, changes));
        if let CacheState::Pending(event) = self.state {
            self.state = CacheState::Cached(event);
        }
    }

    /// Mark the version written and drop scratch data
    pub fn mark_flushed(&mut self) {
        self.clear();
        self.state = CacheState::Flushed;
    }

    /// Mark the cache as producing no version and drop scratch data
    pub fn discard(&mut self) {
        self.clear();
        self.state = CacheState::Discarded;
    }

    fn clear(&mut self) {
        self.pre_image = None;
        self.current = None;
        self.object = None;
        self.object_changes = Snapshot::new();
        self.additional = None;
    }
}
