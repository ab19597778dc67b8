//! Additional-objects snapshot builder

use serde_json::{Map, Value};

use super::{IncludeSpec, TrackingPolicy};
use crate::entities::{load_named_association, EntitySource, EntityState};
use crate::registry::{Cardinality, EntityRegistry};
use crate::types::Snapshot;

/// The subject as seen by include specs and accessors
///
/// Names resolve to the subject's own attribute first, then to a declared
/// association loaded from the entity source.
pub struct SubjectView<'a> {
    state: &'a EntityState,
    source: &'a dyn EntitySource,
    registry: &'a EntityRegistry,
}

impl<'a> SubjectView<'a> {
    pub fn new(
        state: &'a EntityState,
        source: &'a dyn EntitySource,
        registry: &'a EntityRegistry,
    ) -> Self {
        Self {
            state,
            source,
            registry,
        }
    }

    pub fn state(&self) -> &EntityState {
        self.state
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.state.attribute(name)
    }

    /// Entities currently reachable through the association `name`
    pub fn association(&self, name: &str) -> Vec<EntityState> {
        load_named_association(self.source, self.registry, &self.state.subject(), name)
            .map(|(_, targets)| targets)
            .unwrap_or_default()
    }

    /// Value of `name` on the subject: attribute, association, or `null`
    pub fn value_of(&self, name: &str) -> Value {
        if let Some(value) = self.state.attribute(name) {
            return value.clone();
        }

        match load_named_association(self.source, self.registry, &self.state.subject(), name) {
            Some((Cardinality::Many, targets)) => {
                Value::Array(targets.iter().map(EntityState::to_value).collect())
            }
            Some((Cardinality::One, targets)) => targets
                .first()
                .map(EntityState::to_value)
                .unwrap_or(Value::Null),
            None => Value::Null,
        }
    }

    /// `name` treated as a collection: arrays as-is, `null` as empty, anything else wrapped
    pub fn collection_of(&self, name: &str) -> Vec<Value> {
        match self.value_of(name) {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            single => vec![single],
        }
    }
}

/// Build the `additional_objects` snapshot for `view` under `policy`
pub fn build_additional_objects(policy: &TrackingPolicy, view: &SubjectView<'_>) -> Snapshot {
    let mut snapshot = Snapshot::new();

    for (key, spec) in policy.includes() {
        let value = match spec {
            IncludeSpec::Accessor(accessor) => accessor(view),
            IncludeSpec::RawAttribute => view.value_of(key),
            IncludeSpec::CollectionProjection(fields) => Value::Array(
                view.collection_of(key)
                    .iter()
                    .map(|item| project(item, fields))
                    .collect(),
            ),
        };
        snapshot.insert(key.clone(), value);
    }

    snapshot
}

fn project(item: &Value, fields: &[String]) -> Value {
    let mut projected = Map::new();
    for field in fields {
        let value = item.get(field).cloned().unwrap_or(Value::Null);
        projected.insert(field.clone(), value);
    }
    Value::Object(projected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::MemoryEntityStore;
    use crate::registry::{AssociationDef, EntityTypeDef};
    use crate::types::snapshot::snap;
    use serde_json::json;

    fn fixture() -> (MemoryEntityStore, EntityRegistry, EntityState) {
        let store = MemoryEntityStore::new();
        let order = EntityState::new(
            "Order",
            7,
            snap(json!({"status": "pending", "tags": ["rush"], "customer_id": 3})),
        );
        store.insert(order.clone());
        store.insert(EntityState::new(
            "LineItem",
            42,
            snap(json!({"order_id": 7, "sku": "A", "quantity": 2, "price": 10})),
        ));
        store.insert(EntityState::new("Invoice", 5, snap(json!({"order_id": 7, "number": "INV-5"}))));

        let registry = EntityRegistry::new().with_type(
            EntityTypeDef::new("Order")
                .association(AssociationDef::has_many("line_items", "LineItem"))
                .association(AssociationDef::has_one("invoice", "Invoice")),
        );
        (store, registry, order)
    }

    #[test]
    fn test_build_all_include_kinds() {
        let (store, registry, order) = fixture();
        let policy = TrackingPolicy::builder("Order")
            .include_raw("tags")
            .include_projection("line_items", ["sku", "quantity"])
            .include_raw("invoice")
            .include_accessor("item_count", |view| json!(view.association("line_items").len()))
            .build();

        let view = SubjectView::new(&order, &store, &registry);
        let snapshot = build_additional_objects(&policy, &view);

        assert_eq!(
            snapshot,
            snap(json!({
                "tags": ["rush"],
                "line_items": [{"sku": "A", "quantity": 2}],
                "invoice": {"id": 5, "order_id": 7, "number": "INV-5"},
                "item_count": 1
            }))
        );
    }

    #[test]
    fn test_projection_over_attribute_collection() {
        let (store, registry, _) = fixture();
        let order = EntityState::new(
            "Order",
            8,
            snap(json!({"shipments": [{"carrier": "UPS", "cost": 5}, {"carrier": "DHL"}]})),
        );
        let policy = TrackingPolicy::builder("Order")
            .include_projection("shipments", ["carrier", "cost"])
            .build();

        let view = SubjectView::new(&order, &store, &registry);
        let snapshot = build_additional_objects(&policy, &view);
        assert_eq!(
            snapshot.get("shipments"),
            Some(&json!([
                {"carrier": "UPS", "cost": 5},
                {"carrier": "DHL", "cost": null}
            ]))
        );
    }

    #[test]
    fn test_missing_names_resolve_to_null_or_empty() {
        let (store, registry, order) = fixture();
        let view = SubjectView::new(&order, &store, &registry);
        assert_eq!(view.value_of("nothing"), Value::Null);
        assert!(view.collection_of("nothing").is_empty());
        assert_eq!(view.collection_of("status"), vec![json!("pending")]);
    }
}
