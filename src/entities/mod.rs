//! Entity boundary - how the tracker sees domain entities
//!
//! Persistence of domain entities belongs to the host application. The
//! tracker only needs attribute maps keyed by (type, id) and the ability to
//! look up owned entities by foreign key, which `EntitySource` provides.
//! `MemoryEntityStore` is a thread-safe in-memory implementation used by the
//! server binary and the tests.

mod memory;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::{AssociationDef, Cardinality, EntityRegistry};
use crate::types::{EntityId, Snapshot, SubjectRef};

pub use memory::MemoryEntityStore;

/// Attributes of one entity instance at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    #[serde(rename = "entityType")]
    pub entity_type: String,
    pub id: EntityId,
    #[serde(default)]
    pub attributes: Snapshot,
}

impl EntityState {
    pub fn new(entity_type: impl Into<String>, id: EntityId, attributes: Snapshot) -> Self {
        Self {
            entity_type: entity_type.into(),
            id,
            attributes,
        }
    }

    pub fn subject(&self) -> SubjectRef {
        SubjectRef::new(self.entity_type.clone(), self.id)
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Attributes as a JSON object, including `id`
    pub fn to_value(&self) -> Value {
        let mut attributes = self.attributes.clone();
        if !attributes.contains_key("id") {
            attributes.insert("id", Value::from(self.id));
        }
        attributes.into_value()
    }
}

/// Read access to current entity state
pub trait EntitySource: Send + Sync {
    /// Current state of one entity, if it exists
    fn find(&self, entity_type: &str, id: EntityId) -> Option<EntityState>;

    /// All entities of `entity_type` whose `attribute` equals `value`
    fn find_by_attribute(&self, entity_type: &str, attribute: &str, value: &Value)
        -> Vec<EntityState>;
}

/// Entities currently reachable from `owner` through `association`
pub fn load_association(
    source: &dyn EntitySource,
    owner: &SubjectRef,
    association: &AssociationDef,
) -> Vec<EntityState> {
    let foreign_key = association.foreign_key_for(&owner.subject_type);
    let mut targets = source.find_by_attribute(
        &association.target_type,
        &foreign_key,
        &Value::from(owner.subject_id),
    );
    targets.sort_by_key(|t| t.id);

    if association.cardinality == Cardinality::One {
        targets.truncate(1);
    }
    targets
}

/// Resolve an association by name on `owner`, if the registry declares it
pub fn load_named_association(
    source: &dyn EntitySource,
    registry: &EntityRegistry,
    owner: &SubjectRef,
    name: &str,
) -> Option<(Cardinality, Vec<EntityState>)> {
    let def = registry.resolve(&owner.subject_type)?;
    let association = def.find_association(name)?;
    Some((
        association.cardinality,
        load_association(source, owner, association),
    ))
}
