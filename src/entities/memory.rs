//! In-memory entity store

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use parking_lot::RwLock;
use serde_json::Value;

use super::{EntitySource, EntityState};
use crate::types::{EntityId, Snapshot, TrailError, TrailResult};

/// Thread-safe map of entity states keyed by (type, id)
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    entities: RwLock<BTreeMap<(String, EntityId), EntityState>>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load entity states from a JSON-lines file (one `EntityState` per line)
    ///
    /// A missing file yields an empty store.
    pub fn load_jsonl<P: AsRef<Path>>(path: P) -> TrailResult<Self> {
        let path = path.as_ref();
        let store = Self::new();
        if !path.exists() {
            return Ok(store);
        }

        let content = fs::read_to_string(path)?;
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let state: EntityState = serde_json::from_str(line).map_err(|e| {
                TrailError::corruption(format!("{}:{}", path.display(), line_num + 1), e)
            })?;
            store.insert(state);
        }

        tracing::info!(path = %path.display(), count = store.len(), "Loaded entities");
        Ok(store)
    }

    /// Insert or replace an entity, returning the previous state
    pub fn insert(&self, state: EntityState) -> Option<EntityState> {
        self.entities
            .write()
            .insert((state.entity_type.clone(), state.id), state)
    }

    /// Apply `change` to an entity's attributes, returning (before, after)
    pub fn update<F>(&self, entity_type: &str, id: EntityId, change: F) -> Option<(EntityState, EntityState)>
    where
        F: FnOnce(&mut Snapshot),
    {
        let mut entities = self.entities.write();
        let state = entities.get_mut(&(entity_type.to_string(), id))?;
        let before = state.clone();
        change(&mut state.attributes);
        Some((before, state.clone()))
    }

    /// Remove an entity, returning its last state
    pub fn remove(&self, entity_type: &str, id: EntityId) -> Option<EntityState> {
        self.entities.write().remove(&(entity_type.to_string(), id))
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }
}

impl EntitySource for MemoryEntityStore {
    fn find(&self, entity_type: &str, id: EntityId) -> Option<EntityState> {
        self.entities
            .read()
            .get(&(entity_type.to_string(), id))
            .cloned()
    }

    fn find_by_attribute(
        &self,
        entity_type: &str,
        attribute: &str,
        value: &Value,
    ) -> Vec<EntityState> {
        self.entities
            .read()
            .values()
            .filter(|e| e.entity_type == entity_type && e.attribute(attribute) == Some(value))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::snapshot::snap;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_insert_update_remove() {
        let store = MemoryEntityStore::new();
        store.insert(EntityState::new("Order", 7, snap(json!({"status": "pending"}))));

        let (before, after) = store
            .update("Order", 7, |attrs| {
                attrs.insert("status", json!("shipped"));
            })
            .unwrap();
        assert_eq!(before.attribute("status"), Some(&json!("pending")));
        assert_eq!(after.attribute("status"), Some(&json!("shipped")));
        assert_eq!(store.find("Order", 7).unwrap(), after);

        assert!(store.update("Order", 8, |_| {}).is_none());
        assert_eq!(store.remove("Order", 7), Some(after));
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_jsonl() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("entities.jsonl");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, r#"{{"entityType":"Order","id":7,"attributes":{{"status":"pending"}}}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"entityType":"LineItem","id":42,"attributes":{{"order_id":7}}}}"#).unwrap();

        let store = MemoryEntityStore::load_jsonl(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.find_by_attribute("LineItem", "order_id", &json!(7)).len(),
            1
        );
    }

    #[test]
    fn test_load_jsonl_reports_bad_line() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("entities.jsonl");
        fs::write(&path, "{\"entityType\": \"Order\"\n").unwrap();
        let err = MemoryEntityStore::load_jsonl(&path).unwrap_err();
        assert!(matches!(err, TrailError::DataCorruption { .. }));
    }
}
