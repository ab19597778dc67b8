//! Tracker - lifecycle hooks that turn committed mutations into versions
//!
//! The host calls the hooks from its persistence layer:
//!
//! ```text
//! ┌───────────────┐   ┌──────────────────────┐   ┌──────────────────┐
//! │ after_create  │   │ cache event + diffs  │   │ commit():        │
//! │ after_update  │──►│ in the transaction's │──►│ one version per  │
//! │ before_destroy│   │ ChangeCache          │   │ changed subject  │
//! └───────────────┘   └──────────────────────┘   └──────────────────┘
//!                                                  rollback(): discard
//! ```
//!
//! Update and destroy diffs are captured by the hooks, while the state is
//! still reachable. Related objects for creates and updates are read at
//! commit, when they reflect committed state.

mod cache;
mod transaction;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::entities::{EntitySource, EntityState};
use crate::policy::{build_additional_objects, SubjectView, TrackingPolicy};
use crate::registry::EntityRegistry;
use crate::types::{
    NewVersion, Snapshot, SubjectRef, TrailResult, VersionEvent, VersionRecord,
    IGNORED_CHANGE_KEYS,
};
use crate::version_store::VersionStore;

pub use cache::{CacheKey, CacheState, ChangeCache, TransactionId};
pub use transaction::{TrackingScope, Transaction};

/// Registered policies plus the collaborators needed to flush versions
pub struct Tracker {
    policies: HashMap<String, Arc<TrackingPolicy>>,
    registry: Arc<EntityRegistry>,
    entities: Arc<dyn EntitySource>,
    store: Arc<VersionStore>,
    next_transaction: AtomicU64,
}

impl Tracker {
    pub fn new(
        registry: Arc<EntityRegistry>,
        entities: Arc<dyn EntitySource>,
        store: Arc<VersionStore>,
    ) -> Self {
        Self {
            policies: HashMap::new(),
            registry,
            entities,
            store,
            next_transaction: AtomicU64::new(1),
        }
    }

    /// Register (or replace) the policy for its entity type
    pub fn register(&mut self, policy: TrackingPolicy) -> &mut Self {
        tracing::debug!(entity_type = policy.entity_type(), "Registered tracking policy");
        self.policies
            .insert(policy.entity_type().to_string(), Arc::new(policy));
        self
    }

    pub fn with_policy(mut self, policy: TrackingPolicy) -> Self {
        self.register(policy);
        self
    }

    pub fn policy(&self, entity_type: &str) -> Option<&TrackingPolicy> {
        self.policies.get(entity_type).map(Arc::as_ref)
    }

    pub fn store(&self) -> &Arc<VersionStore> {
        &self.store
    }

    /// Open a tracking context for a new host transaction
    pub fn begin(&self, actor: Option<String>) -> Transaction {
        let id = TransactionId(self.next_transaction.fetch_add(1, Ordering::SeqCst));
        Transaction::new(id, actor)
    }

    /// Policy applying to `state` for `event`, if tracking should happen
    fn active_policy(
        &self,
        txn: &Transaction,
        state: &EntityState,
        event: VersionEvent,
    ) -> Option<Arc<TrackingPolicy>> {
        if txn.is_finished() {
            tracing::warn!(txn = %txn.id(), subject = %state.subject(), "Hook on finished transaction ignored");
            return None;
        }
        if !txn.is_tracking_enabled() {
            return None;
        }

        let policy = self.policies.get(&state.entity_type)?;
        if policy.tracks(event) && policy.is_enabled_for(state) {
            Some(Arc::clone(policy))
        } else {
            None
        }
    }

    /// Hook: `state` was inserted in `txn`
    pub fn after_create(&self, txn: &mut Transaction, state: &EntityState) {
        if self.active_policy(txn, state, VersionEvent::Create).is_none() {
            return;
        }

        let subject = state.subject();
        let event = txn
            .cache_entry(&subject)
            .record(VersionEvent::Create, None, state.clone());
        tracing::debug!(txn = %txn.id(), %subject, ?event, "Cached create");
    }

    /// Hook: `before` was saved as `after` in `txn`
    ///
    /// The attribute diff is computed now, against the pre-image of the
    /// first tracked mutation of this subject in the transaction.
    pub fn after_update(&self, txn: &mut Transaction, before: &EntityState, after: &EntityState) {
        let Some(policy) = self.active_policy(txn, after, VersionEvent::Update) else {
            return;
        };

        let subject = after.subject();
        let cache = txn.cache_entry(&subject);
        let event = cache.record(
            VersionEvent::Update,
            Some(before.attributes.clone()),
            after.clone(),
        );

        if event == Some(VersionEvent::Update) {
            let pre_image = cache.pre_image().cloned().unwrap_or_default();
            let changes = policy.strip_skipped(&Snapshot::diff(&pre_image, &after.attributes));
            cache.cache_object(Some(policy.strip_skipped(&pre_image)), changes);
        }
        tracing::debug!(txn = %txn.id(), %subject, ?event, "Cached update");
    }

    /// Hook: `state` is about to be removed in `txn`
    ///
    /// Everything is captured now; related objects may be unreachable once
    /// the removal completes.
    pub fn before_destroy(&self, txn: &mut Transaction, state: &EntityState) -> TrailResult<()> {
        let Some(policy) = self.active_policy(txn, state, VersionEvent::Destroy) else {
            return Ok(());
        };

        let subject = state.subject();
        let event = txn.cache_entry(&subject).record(
            VersionEvent::Destroy,
            Some(state.attributes.clone()),
            state.clone(),
        );

        if event == Some(VersionEvent::Destroy) {
            let object = policy.strip_skipped(&state.attributes);
            let changes = Snapshot::diff(&object, &Snapshot::new());
            let (additional, additional_changes) = self.capture_additional(&policy, state)?;

            let cache = txn.cache_entry(&subject);
            cache.cache_object(Some(object), changes);
            cache.cache_additional(additional, additional_changes);
        }
        tracing::debug!(txn = %txn.id(), %subject, ?event, "Cached destroy");
        Ok(())
    }

    /// Post-commit hook: write one version per subject with real changes
    ///
    /// Every cache is attempted even when one fails to flush. On error the
    /// transaction stays open: flushed caches are done and the rest are
    /// written by the next `commit`. Once everything is flushed, calling
    /// commit again, or after `rollback`, is a no-op.
    pub fn commit(&self, txn: &mut Transaction) -> TrailResult<Vec<Arc<VersionRecord>>> {
        if txn.is_finished() {
            return Ok(Vec::new());
        }

        let txn_id = txn.id();
        let actor = txn.actor().map(str::to_string);
        let mut written = Vec::new();
        let mut failure = None;

        for cache in txn.caches_mut() {
            match self.finalize(cache, actor.clone()) {
                Ok(Some(record)) => written.push(record),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        txn = %txn_id,
                        subject = %cache.key().subject,
                        error = %e,
                        "Version flush failed, kept for retry"
                    );
                    failure.get_or_insert(e);
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        txn.close();
        Ok(written)
    }

    /// The transaction rolled back: drop every cache without writing
    pub fn rollback(&self, txn: &mut Transaction) {
        if txn.is_finished() {
            return;
        }
        for cache in txn.caches_mut() {
            cache.discard();
        }
        txn.close();
        tracing::debug!(txn = %txn.id(), "Rolled back, caches discarded");
    }

    /// Flush or discard one cache; finished caches produce nothing
    pub fn finalize(
        &self,
        cache: &mut ChangeCache,
        actor: Option<String>,
    ) -> TrailResult<Option<Arc<VersionRecord>>> {
        let Some(event) = cache.state().event() else {
            return Ok(None);
        };
        let subject = cache.key().subject.clone();

        let Some(policy) = self.policies.get(&subject.subject_type).cloned() else {
            cache.discard();
            return Ok(None);
        };

        if matches!(event, VersionEvent::Create | VersionEvent::Update) {
            self.capture_deferred(cache, &policy, event)?;
        }

        let object = cache.object().cloned();
        let object_changes = cache.object_changes().clone();
        let (additional_objects, additional_objects_changes) =
            cache.additional().cloned().unwrap_or_default();

        let real_changes = object_changes.without(IGNORED_CHANGE_KEYS);
        if real_changes.is_empty() && additional_objects_changes.is_empty() {
            cache.discard();
            tracing::debug!(%subject, %event, "No changes, version discarded");
            return Ok(None);
        }

        let record = self.store.insert(NewVersion {
            subject: subject.clone(),
            event,
            actor,
            object: if event == VersionEvent::Create { None } else { object },
            object_changes,
            additional_objects,
            additional_objects_changes,
        })?;
        cache.mark_flushed();

        tracing::info!(version_id = record.id, %subject, %event, "Version recorded");
        Ok(Some(record))
    }

    /// Commit-time capture for creates and updates
    fn capture_deferred(
        &self,
        cache: &mut ChangeCache,
        policy: &TrackingPolicy,
        event: VersionEvent,
    ) -> TrailResult<()> {
        let subject = &cache.key().subject;
        let committed = self
            .entities
            .find(&subject.subject_type, subject.subject_id)
            .or_else(|| cache.current().cloned());
        let Some(committed) = committed else {
            return Ok(());
        };

        if event == VersionEvent::Create {
            let baseline = match self.registry.resolve(&committed.entity_type) {
                Some(def) => def.defaults_for(committed.attributes.keys()),
                None => committed
                    .attributes
                    .keys()
                    .map(|k| (k.clone(), serde_json::Value::Null))
                    .collect(),
            };
            let changes = policy.strip_skipped(&Snapshot::diff(&baseline, &committed.attributes));
            cache.cache_object(None, changes);
        }

        let (additional, additional_changes) = self.capture_additional(policy, &committed)?;
        cache.cache_additional(additional, additional_changes);
        Ok(())
    }

    /// Build `additional_objects` and diff it against the subject's last version
    fn capture_additional(
        &self,
        policy: &TrackingPolicy,
        state: &EntityState,
    ) -> TrailResult<(Snapshot, Snapshot)> {
        if policy.includes().is_empty() {
            return Ok((Snapshot::new(), Snapshot::new()));
        }

        let view = SubjectView::new(state, self.entities.as_ref(), &self.registry);
        let current = build_additional_objects(policy, &view);
        let previous = self.previous_additional_objects(&state.subject());

        let changes = Snapshot::diff(&previous, &current);
        Ok((current, changes))
    }

    fn previous_additional_objects(&self, subject: &SubjectRef) -> Snapshot {
        match self.store.latest_for(subject) {
            Some(record) => record.additional_objects().unwrap_or_else(|e| {
                tracing::warn!(%subject, error = %e, "Previous additional objects unreadable, diffing against empty");
                Snapshot::new()
            }),
            None => Snapshot::new(),
        }
    }
}
