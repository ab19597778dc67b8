//! Transaction context threaded through tracking hooks

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use super::cache::{CacheKey, ChangeCache, TransactionId};
use crate::types::SubjectRef;

/// The tracking context of one host transaction
///
/// Owns the change caches of every subject touched in the transaction. The
/// tracking switch lives here rather than in global state, so turning it off
/// only affects hooks that receive this transaction.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    actor: Option<String>,
    tracking_enabled: bool,
    caches: BTreeMap<SubjectRef, ChangeCache>,
    finished: bool,
}

impl Transaction {
    pub fn new(id: TransactionId, actor: Option<String>) -> Self {
        Self {
            id,
            actor,
            tracking_enabled: true,
            caches: BTreeMap::new(),
            finished: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Who is making the changes, recorded on every version
    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    pub fn set_actor(&mut self, actor: Option<String>) {
        self.actor = actor;
    }

    pub fn is_tracking_enabled(&self) -> bool {
        self.tracking_enabled
    }

    /// Whether the transaction was committed or rolled back
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Set tracking for the lifetime of the returned guard
    ///
    /// The previous setting is restored when the guard drops.
    pub fn with_tracking(&mut self, enabled: bool) -> TrackingScope<'_> {
        let previous = self.tracking_enabled;
        self.tracking_enabled = enabled;
        TrackingScope {
            txn: self,
            previous,
        }
    }

    pub fn without_tracking(&mut self) -> TrackingScope<'_> {
        self.with_tracking(false)
    }

    pub fn cache(&self, subject: &SubjectRef) -> Option<&ChangeCache> {
        self.caches.get(subject)
    }

    pub fn pending_count(&self) -> usize {
        self.caches
            .values()
            .filter(|c| c.state().event().is_some())
            .count()
    }

    pub(crate) fn cache_entry(&mut self, subject: &SubjectRef) -> &mut ChangeCache {
        let id = self.id;
        self.caches
            .entry(subject.clone())
            .or_insert_with(|| {
                ChangeCache::new(CacheKey {
                    transaction: id,
                    subject: subject.clone(),
                })
            })
    }

    pub(crate) fn caches_mut(&mut self) -> impl Iterator<Item = &mut ChangeCache> {
        self.caches.values_mut()
    }

    /// Mark the transaction finished and drop its caches
    ///
    /// Only called once every cache is flushed or discarded.
    pub(crate) fn close(&mut self) {
        self.finished = true;
        self.caches.clear();
    }
}

/// Guard restoring the previous tracking setting on drop
pub struct TrackingScope<'a> {
    txn: &'a mut Transaction,
    previous: bool,
}

impl Deref for TrackingScope<'_> {
    type Target = Transaction;

    fn deref(&self) -> &Transaction {
        self.txn
    }
}

impl DerefMut for TrackingScope<'_> {
    fn deref_mut(&mut self) -> &mut Transaction {
        self.txn
    }
}

impl Drop for TrackingScope<'_> {
    fn drop(&mut self) {
        self.txn.tracking_enabled = self.previous;
    }
}
