//! Tracking Integration Tests
//!
//! Tests for the complete tracking flow including:
//! - Hooks, commit and rollback against a persistent store
//! - Replay of the version log after restart
//! - Related-object snapshots across versions
//! - Concurrent transactions

use std::fs;
use std::sync::Arc;
use std::thread;

use serde_json::json;
use tempfile::TempDir;

use version_trail::entities::{EntitySource, EntityState, MemoryEntityStore};
use version_trail::{
    AssociationDef, EntityRegistry, EntityTypeDef, FieldDef, FieldKind, Snapshot, Tracker,
    TrackingPolicy, VersionEvent, VersionStore, VersionStoreConfig,
};

fn snapshot(value: serde_json::Value) -> Snapshot {
    Snapshot::from_value(value).unwrap()
}

fn registry() -> Arc<EntityRegistry> {
    Arc::new(
        EntityRegistry::new()
            .with_type(
                EntityTypeDef::new("Order")
                    .field("status", FieldDef::with_default(FieldKind::String, json!("pending")))
                    .field("total", FieldDef::with_default(FieldKind::Integer, json!(0)))
                    .field("notes", FieldDef::new(FieldKind::String))
                    .association(AssociationDef::has_many("line_items", "LineItem")),
            )
            .with_type(
                EntityTypeDef::new("LineItem")
                    .field("sku", FieldDef::new(FieldKind::String))
                    .field("quantity", FieldDef::with_default(FieldKind::Integer, json!(1))),
            ),
    )
}

fn order_policy() -> TrackingPolicy {
    TrackingPolicy::builder("Order")
        .skip("notes")
        .include_projection("line_items", ["sku", "quantity"])
        .build()
}

fn tracker(entities: &Arc<MemoryEntityStore>, store: &Arc<VersionStore>) -> Tracker {
    Tracker::new(
        registry(),
        entities.clone() as Arc<dyn EntitySource>,
        store.clone(),
    )
    .with_policy(order_policy())
    .with_policy(TrackingPolicy::builder("LineItem").build())
}

#[test]
fn test_full_lifecycle_persists_and_replays() {
    let dir = TempDir::new().unwrap();
    let config = VersionStoreConfig::new(dir.path());
    let entities = Arc::new(MemoryEntityStore::new());

    {
        let store = Arc::new(VersionStore::open(config.clone()).unwrap());
        let tracker = tracker(&entities, &store);

        // Create order with one line item
        let mut txn = tracker.begin(Some("1".to_string()));
        let order = EntityState::new("Order", 7, snapshot(json!({"status": "pending", "total": 100})));
        let item = EntityState::new("LineItem", 42, snapshot(json!({"order_id": 7, "sku": "A", "quantity": 2})));
        entities.insert(order.clone());
        entities.insert(item.clone());
        tracker.after_create(&mut txn, &order);
        tracker.after_create(&mut txn, &item);
        let created = tracker.commit(&mut txn).unwrap();
        assert_eq!(created.len(), 2);

        // Ship it
        let mut txn = tracker.begin(Some("2".to_string()));
        let (before, after) = entities
            .update("Order", 7, |a| {
                a.insert("status", json!("shipped"));
            })
            .unwrap();
        tracker.after_update(&mut txn, &before, &after);
        let updated = tracker.commit(&mut txn).unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].object_changes().unwrap(), snapshot(json!({"status": "shipped"})));
        assert_eq!(
            updated[0].object().unwrap(),
            snapshot(json!({"status": "pending", "total": 100}))
        );
        // Line items did not change since the create
        assert!(updated[0].additional_objects_changes().unwrap().is_empty());
    }

    // Restart: the log replays into a fresh store
    let store = VersionStore::open(config).unwrap();
    assert_eq!(store.len(), 3);
    assert_eq!(store.skipped_lines(), 0);

    let history = store.for_subject(&version_trail::SubjectRef::new("Order", 7), None, 0);
    let events: Vec<VersionEvent> = history.iter().map(|r| r.event).collect();
    assert_eq!(events, vec![VersionEvent::Update, VersionEvent::Create]);
    assert_eq!(history[0].actor.as_deref(), Some("2"));
    assert_eq!(
        history[1].additional_objects().unwrap(),
        snapshot(json!({"line_items": [{"sku": "A", "quantity": 2}]}))
    );
}

#[test]
fn test_ids_continue_after_replay() {
    let dir = TempDir::new().unwrap();
    let config = VersionStoreConfig::new(dir.path());
    let entities = Arc::new(MemoryEntityStore::new());
    let before = EntityState::new("LineItem", 1, snapshot(json!({"sku": "A"})));
    let after = EntityState::new("LineItem", 1, snapshot(json!({"sku": "B"})));

    let first_id = {
        let store = Arc::new(VersionStore::open(config.clone()).unwrap());
        let tracker = tracker(&entities, &store);
        let mut txn = tracker.begin(None);
        tracker.after_update(&mut txn, &before, &after);
        tracker.commit(&mut txn).unwrap()[0].id
    };

    let store = Arc::new(VersionStore::open(config).unwrap());
    let tracker = tracker(&entities, &store);
    let mut txn = tracker.begin(None);
    tracker.after_update(&mut txn, &after, &before);
    let second = tracker.commit(&mut txn).unwrap();

    assert_eq!(second[0].id, first_id + 1);
    assert!(second[0].created_at > store.get(first_id).unwrap().created_at);
}

#[test]
fn test_rolled_back_transaction_leaves_no_trace() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(VersionStore::open(VersionStoreConfig::new(dir.path())).unwrap());
    let entities = Arc::new(MemoryEntityStore::new());
    let tracker = tracker(&entities, &store);

    let order = EntityState::new("Order", 7, snapshot(json!({"status": "pending", "total": 5})));
    let mut txn = tracker.begin(None);
    tracker.after_create(&mut txn, &order);
    tracker.before_destroy(&mut txn, &order).unwrap();
    tracker.rollback(&mut txn);

    assert!(store.is_empty());
    assert!(!dir.path().join("versions.jsonl").exists());
}

#[test]
fn test_failed_commit_keeps_versions_for_retry() {
    let dir = TempDir::new().unwrap();
    // The data dir sits under a regular file, so appends fail
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "").unwrap();
    let store = Arc::new(VersionStore::open(VersionStoreConfig::new(blocker.join("data"))).unwrap());
    let entities = Arc::new(MemoryEntityStore::new());
    let tracker = tracker(&entities, &store);

    let mut txn = tracker.begin(Some("1".to_string()));
    tracker.after_update(
        &mut txn,
        &EntityState::new("LineItem", 1, snapshot(json!({"sku": "A"}))),
        &EntityState::new("LineItem", 1, snapshot(json!({"sku": "B"}))),
    );
    tracker.after_update(
        &mut txn,
        &EntityState::new("LineItem", 2, snapshot(json!({"quantity": 1}))),
        &EntityState::new("LineItem", 2, snapshot(json!({"quantity": 5}))),
    );

    assert!(tracker.commit(&mut txn).is_err());
    assert!(!txn.is_finished());
    assert_eq!(txn.pending_count(), 2);
    assert!(store.is_empty());

    fs::remove_file(&blocker).unwrap();
    let written = tracker.commit(&mut txn).unwrap();
    assert_eq!(written.len(), 2);
    assert!(txn.is_finished());
    assert!(tracker.commit(&mut txn).unwrap().is_empty());

    let replayed = VersionStore::open(VersionStoreConfig::new(blocker.join("data"))).unwrap();
    assert_eq!(replayed.len(), 2);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_create_then_destroy_in_one_transaction_writes_nothing() {
    let store = Arc::new(VersionStore::in_memory());
    let entities = Arc::new(MemoryEntityStore::new());
    let tracker = tracker(&entities, &store);

    let order = EntityState::new("Order", 9, snapshot(json!({"status": "pending", "total": 5})));
    let mut txn = tracker.begin(None);
    tracker.after_create(&mut txn, &order);
    tracker.before_destroy(&mut txn, &order).unwrap();
    assert!(tracker.commit(&mut txn).unwrap().is_empty());
    assert!(store.is_empty());
}

#[test]
fn test_destroy_always_captures_object() {
    let store = Arc::new(VersionStore::in_memory());
    let entities = Arc::new(MemoryEntityStore::new());
    let tracker = tracker(&entities, &store);

    // Even an entity left entirely at defaults has its state captured
    let order = EntityState::new("Order", 7, snapshot(json!({"status": "pending", "total": 0})));
    entities.insert(order.clone());

    let mut txn = tracker.begin(None);
    tracker.before_destroy(&mut txn, &order).unwrap();
    entities.remove("Order", 7);
    let written = tracker.commit(&mut txn).unwrap();

    assert_eq!(written.len(), 1);
    assert_eq!(written[0].event, VersionEvent::Destroy);
    assert!(!written[0].object().unwrap().is_empty());
}

#[test]
fn test_translated_attributes_are_skipped() {
    let store = Arc::new(VersionStore::in_memory());
    let entities = Arc::new(MemoryEntityStore::new());
    let tracker = Tracker::new(registry(), entities as Arc<dyn EntitySource>, store.clone())
        .with_policy(TrackingPolicy::builder("LineItem").translated(["name"]).build());

    let before = EntityState::new("LineItem", 1, snapshot(json!({"name_translations": {"en": "Cup"}})));
    let after = EntityState::new("LineItem", 1, snapshot(json!({"name_translations": {"en": "Mug"}})));

    let mut txn = tracker.begin(None);
    tracker.after_update(&mut txn, &before, &after);
    assert!(tracker.commit(&mut txn).unwrap().is_empty());
}

#[test]
fn test_concurrent_transactions() {
    let store = Arc::new(VersionStore::in_memory());
    let entities = Arc::new(MemoryEntityStore::new());
    let tracker = Arc::new(tracker(&entities, &store));

    let mut handles = vec![];
    for i in 0..8u64 {
        let tracker = Arc::clone(&tracker);
        let handle = thread::spawn(move || {
            for j in 0..10u64 {
                let before = EntityState::new("LineItem", i, snapshot(json!({"quantity": j})));
                let after = EntityState::new("LineItem", i, snapshot(json!({"quantity": j + 1})));
                let mut txn = tracker.begin(Some(i.to_string()));
                tracker.after_update(&mut txn, &before, &after);
                tracker.commit(&mut txn).unwrap();
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), 80);
    let all = store.all();
    let mut ids: Vec<u64> = all.iter().map(|r| r.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=80).collect::<Vec<_>>());
    assert!(all.windows(2).all(|w| w[0].created_at > w[1].created_at));
}
