//! Audit Log - read side of the version trail
//!
//! Answers history questions over the version store: latest-N, full history,
//! deep history across associations, and filtered search. Records are
//! presented with their subject resolved against the registry and entity
//! source, typed snapshots, and the actor's display identity.

mod actor;
mod deep;

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::entities::{EntitySource, EntityState};
use crate::registry::{EntityRegistry, EntityTypeDef};
use crate::types::{
    Materialized, Snapshot, SubjectRef, TrailError, TrailResult, VersionRecord, GENERIC_TYPE_NAME,
};
use crate::version_store::{VersionFilter, VersionPage, VersionStore};

pub use actor::{display_actor, ActorResolver, StaticActorResolver, UNKNOWN_ACTOR};
pub use deep::associated_subjects;

/// Default number of records returned by `latest`
pub const DEFAULT_LATEST_COUNT: usize = 5;

/// Query facade over stored versions
pub struct AuditLog {
    store: Arc<VersionStore>,
    registry: Arc<EntityRegistry>,
    entities: Arc<dyn EntitySource>,
    actors: Arc<dyn ActorResolver>,
    max_depth: Option<usize>,
}

impl AuditLog {
    pub fn new(
        store: Arc<VersionStore>,
        registry: Arc<EntityRegistry>,
        entities: Arc<dyn EntitySource>,
    ) -> Self {
        Self {
            store,
            registry,
            entities,
            actors: Arc::new(StaticActorResolver::new()),
            max_depth: None,
        }
    }

    pub fn with_actor_resolver(mut self, actors: Arc<dyn ActorResolver>) -> Self {
        self.actors = actors;
        self
    }

    /// Limit deep traversal to `depth` association hops
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn store(&self) -> &Arc<VersionStore> {
        &self.store
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    // ========================================================================
    // History queries
    // ========================================================================

    /// The `count` most recent records of `subject`, newest first
    pub fn latest(&self, subject: &SubjectRef, count: usize) -> Vec<Arc<VersionRecord>> {
        self.store.for_subject(subject, Some(count), 0)
    }

    /// Every record of `subject`, newest first
    pub fn history(&self, subject: &SubjectRef) -> Vec<Arc<VersionRecord>> {
        self.store.for_subject(subject, None, 0)
    }

    /// Records of `subject` and of every entity currently associated with it
    ///
    /// Associations are evaluated now; records of entities that were
    /// associated in the past but no longer are do not appear.
    pub fn deep_history(&self, subject: &SubjectRef, limit: Option<usize>) -> Vec<Arc<VersionRecord>> {
        let subjects = self.related_subjects(subject);
        tracing::debug!(%subject, related = subjects.len(), "Deep history");
        self.store.for_subjects(&subjects, limit, 0)
    }

    /// Deep history for a `"Type:id"` token
    pub fn find_by_composite_key(
        &self,
        token: &str,
        limit: Option<usize>,
    ) -> TrailResult<Vec<Arc<VersionRecord>>> {
        let subject = self.resolve_token(token)?;
        Ok(self.deep_history(&subject, limit))
    }

    /// Filtered search, optionally restricted to the deep history of `item`
    pub fn search(
        &self,
        filter: &VersionFilter,
        item: Option<&str>,
        limit: Option<usize>,
        offset: usize,
    ) -> TrailResult<VersionPage> {
        match item {
            Some(token) => {
                let subject = self.resolve_token(token)?;
                let subjects = self.related_subjects(&subject);
                Ok(self.store.search_within(&subjects, filter, limit, offset))
            }
            None => Ok(self.store.search(filter, limit, offset)),
        }
    }

    pub fn get(&self, id: u64) -> TrailResult<Arc<VersionRecord>> {
        self.store
            .get(id)
            .ok_or_else(|| TrailError::NotFound(format!("version {}", id)))
    }

    fn related_subjects(&self, subject: &SubjectRef) -> BTreeSet<SubjectRef> {
        associated_subjects(&self.registry, self.entities.as_ref(), subject, self.max_depth)
    }

    /// Parse a `"Type:id"` token naming a registered type and an existing entity
    fn resolve_token(&self, token: &str) -> TrailResult<SubjectRef> {
        let subject = SubjectRef::parse_composite(token)?;
        self.registry.require(&subject.subject_type)?;
        if self
            .entities
            .find(&subject.subject_type, subject.subject_id)
            .is_none()
        {
            return Err(TrailError::NotFound(format!("entity {}", subject)));
        }
        Ok(subject)
    }

    // ========================================================================
    // Record presentation
    // ========================================================================

    /// Current state of the record's subject, if its type resolves and it still exists
    pub fn item(&self, record: &VersionRecord) -> Option<EntityState> {
        if !self.registry.contains(&record.subject_type) {
            return None;
        }
        self.entities.find(&record.subject_type, record.subject_id)
    }

    /// Declaration of the record's subject type; `None` means the generic fallback
    pub fn item_class(&self, record: &VersionRecord) -> Option<&EntityTypeDef> {
        self.registry.resolve(&record.subject_type)
    }

    pub fn item_class_name(&self, record: &VersionRecord) -> &str {
        self.item_class(record)
            .map(|def| def.name.as_str())
            .unwrap_or(GENERIC_TYPE_NAME)
    }

    /// Pre-event state as typed values; `None` for creates
    pub fn object_snapshot(&self, record: &VersionRecord) -> TrailResult<Option<Materialized>> {
        if record.object.is_blank() {
            return Ok(None);
        }
        Ok(Some(self.materialize(record, record.object()?)))
    }

    pub fn object_snapshot_changes(&self, record: &VersionRecord) -> TrailResult<Materialized> {
        Ok(self.materialize(record, record.object_changes()?))
    }

    pub fn additional_objects_snapshot(&self, record: &VersionRecord) -> TrailResult<Materialized> {
        Ok(self.materialize(record, record.additional_objects()?))
    }

    pub fn additional_objects_snapshot_changes(
        &self,
        record: &VersionRecord,
    ) -> TrailResult<Materialized> {
        Ok(self.materialize(record, record.additional_objects_changes()?))
    }

    fn materialize(&self, record: &VersionRecord, snapshot: Snapshot) -> Materialized {
        snapshot.materialize(self.item_class(record))
    }

    /// Display identity of whoever made the change
    pub fn who(&self, record: &VersionRecord) -> String {
        display_actor(self.actors.as_ref(), record.actor.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::MemoryEntityStore;
    use crate::registry::{AssociationDef, FieldDef, FieldKind};
    use crate::types::snapshot::snap;
    use crate::types::{NewVersion, StoredSnapshot, TypedValue, VersionEvent};
    use serde_json::json;

    struct Fixture {
        entities: Arc<MemoryEntityStore>,
        store: Arc<VersionStore>,
        audit: AuditLog,
    }

    fn fixture() -> Fixture {
        let registry = EntityRegistry::new()
            .with_type(
                EntityTypeDef::new("Order")
                    .field("total", FieldDef::new(FieldKind::Integer))
                    .association(AssociationDef::has_many("line_items", "LineItem")),
            )
            .with_type(EntityTypeDef::new("LineItem"));
        let entities = Arc::new(MemoryEntityStore::new());
        let store = Arc::new(VersionStore::in_memory());
        let audit = AuditLog::new(
            store.clone(),
            Arc::new(registry),
            entities.clone() as Arc<dyn EntitySource>,
        )
        .with_actor_resolver(Arc::new(StaticActorResolver::new().with_actor("1", "alice")));
        Fixture {
            entities,
            store,
            audit,
        }
    }

    fn record(store: &VersionStore, subject: SubjectRef, event: VersionEvent, changes: serde_json::Value) -> Arc<VersionRecord> {
        store
            .insert(NewVersion {
                subject,
                event,
                actor: Some("1".into()),
                object: (event != VersionEvent::Create).then(|| snap(json!({"total": "100"}))),
                object_changes: snap(changes),
                additional_objects: Snapshot::new(),
                additional_objects_changes: Snapshot::new(),
            })
            .unwrap()
    }

    fn ids(records: &[Arc<VersionRecord>]) -> Vec<u64> {
        records.iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_latest_is_prefix_of_history() {
        let fx = fixture();
        let order = SubjectRef::new("Order", 7);
        for i in 0..8 {
            record(&fx.store, order.clone(), VersionEvent::Update, json!({ "total": i }));
        }

        let latest = fx.audit.latest(&order, DEFAULT_LATEST_COUNT);
        let history = fx.audit.history(&order);
        assert_eq!(latest.len(), 5);
        assert_eq!(history.len(), 8);
        assert_eq!(ids(&latest), ids(&history[..5]));
        assert!(latest.windows(2).all(|w| w[0].created_at > w[1].created_at));
    }

    #[test]
    fn test_deep_history_includes_current_associations_only() {
        let fx = fixture();
        fx.entities.insert(EntityState::new("Order", 7, Snapshot::new()));
        fx.entities.insert(EntityState::new("LineItem", 42, snap(json!({"order_id": 7}))));
        fx.entities.insert(EntityState::new("LineItem", 99, snap(json!({"order_id": 8}))));

        record(&fx.store, SubjectRef::new("Order", 7), VersionEvent::Update, json!({"total": 1}));
        record(&fx.store, SubjectRef::new("LineItem", 42), VersionEvent::Update, json!({"sku": "A"}));
        record(&fx.store, SubjectRef::new("LineItem", 99), VersionEvent::Update, json!({"sku": "B"}));

        let deep = fx.audit.deep_history(&SubjectRef::new("Order", 7), None);
        assert_eq!(ids(&deep), vec![2, 1]);

        let limited = fx.audit.deep_history(&SubjectRef::new("Order", 7), Some(1));
        assert_eq!(ids(&limited), vec![2]);
    }

    #[test]
    fn test_find_by_composite_key_errors() {
        let fx = fixture();
        for token in ["Order", "Order:", "Order:abc", ":7"] {
            let err = fx.audit.find_by_composite_key(token, None).unwrap_err();
            assert!(err.is_not_found(), "{token} should be not found");
        }
        let err = fx.audit.find_by_composite_key("Ghost:1", None).unwrap_err();
        assert!(matches!(err, TrailError::UnknownEntityType(_)));

        // Well-formed but no such entity
        let err = fx.audit.find_by_composite_key("Order:7", None).unwrap_err();
        assert!(matches!(err, TrailError::NotFound(_)));

        fx.entities.insert(EntityState::new("Order", 7, Snapshot::new()));
        assert!(fx.audit.find_by_composite_key("Order:7", None).unwrap().is_empty());
    }

    #[test]
    fn test_search_with_item_token() {
        let fx = fixture();
        fx.entities.insert(EntityState::new("Order", 7, Snapshot::new()));
        fx.entities.insert(EntityState::new("LineItem", 42, snap(json!({"order_id": 7}))));
        record(&fx.store, SubjectRef::new("Order", 7), VersionEvent::Update, json!({"total": 1}));
        record(&fx.store, SubjectRef::new("LineItem", 42), VersionEvent::Update, json!({"sku": "A"}));
        record(&fx.store, SubjectRef::new("Order", 8), VersionEvent::Update, json!({"total": 2}));

        let page = fx
            .audit
            .search(&VersionFilter::new(), Some("Order:7"), None, 0)
            .unwrap();
        assert_eq!(ids(&page.records), vec![2, 1]);

        let page = fx
            .audit
            .search(&VersionFilter::new().text("sku"), Some("Order:7"), None, 0)
            .unwrap();
        assert_eq!(ids(&page.records), vec![2]);

        assert!(fx.audit.search(&VersionFilter::new(), Some("bad"), None, 0).is_err());
        assert_eq!(fx.audit.search(&VersionFilter::new(), None, None, 0).unwrap().total, 3);
    }

    #[test]
    fn test_item_and_item_class() {
        let fx = fixture();
        fx.entities.insert(EntityState::new("Order", 7, Snapshot::new()));
        let known = record(&fx.store, SubjectRef::new("Order", 7), VersionEvent::Update, json!({"total": 1}));
        let gone = record(&fx.store, SubjectRef::new("Order", 8), VersionEvent::Destroy, json!({"total": null}));
        let unknown = record(&fx.store, SubjectRef::new("Ghost", 1), VersionEvent::Update, json!({"x": 1}));

        assert!(fx.audit.item(&known).is_some());
        assert!(fx.audit.item(&gone).is_none());
        assert!(fx.audit.item(&unknown).is_none());
        assert_eq!(fx.audit.item_class_name(&known), "Order");
        assert_eq!(fx.audit.item_class_name(&unknown), GENERIC_TYPE_NAME);
    }

    #[test]
    fn test_typed_snapshots() {
        let fx = fixture();
        let created = record(&fx.store, SubjectRef::new("Order", 7), VersionEvent::Create, json!({"total": 5}));
        let updated = record(&fx.store, SubjectRef::new("Order", 7), VersionEvent::Update, json!({"total": 6}));

        assert!(fx.audit.object_snapshot(&created).unwrap().is_none());
        let object = fx.audit.object_snapshot(&updated).unwrap().unwrap();
        assert!(object.typed);
        assert_eq!(object.get("total"), Some(&TypedValue::Integer(100)));

        let changes = fx.audit.object_snapshot_changes(&updated).unwrap();
        assert_eq!(changes.get("total"), Some(&TypedValue::Integer(6)));
        assert!(fx.audit.additional_objects_snapshot(&updated).unwrap().fields.is_empty());
        assert!(fx
            .audit
            .additional_objects_snapshot_changes(&updated)
            .unwrap()
            .fields
            .is_empty());
    }

    #[test]
    fn test_corrupt_column_surfaces_on_read() {
        let fx = fixture();
        let mut corrupt = (*record(&fx.store, SubjectRef::new("Order", 7), VersionEvent::Update, json!({"total": 1}))).clone();
        corrupt.object_changes = StoredSnapshot::from_raw("{not json");

        let err = fx.audit.object_snapshot_changes(&corrupt).unwrap_err();
        assert!(matches!(err, TrailError::DataCorruption { .. }));
    }

    #[test]
    fn test_who() {
        let fx = fixture();
        let mut rec = (*record(&fx.store, SubjectRef::new("Order", 7), VersionEvent::Update, json!({"total": 1}))).clone();
        assert_eq!(fx.audit.who(&rec), "alice");
        rec.actor = Some("404".into());
        assert_eq!(fx.audit.who(&rec), UNKNOWN_ACTOR);
        rec.actor = None;
        assert_eq!(fx.audit.who(&rec), UNKNOWN_ACTOR);
    }

    #[test]
    fn test_get_missing_version() {
        let fx = fixture();
        assert!(matches!(fx.audit.get(1), Err(TrailError::NotFound(_))));
    }
}
