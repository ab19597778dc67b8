//! Entity Registry - statically declared entity types and associations
//!
//! Every tracked entity type declares its fields (used to coerce stored
//! snapshots back into typed values and to know attribute defaults) and its
//! associations (walked by the deep history query). The registry is built
//! once at startup, either in code or from a JSON file, and shared read-only.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Snapshot, TrailError, TrailResult};

/// Storage kind of a declared field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Boolean,
    Integer,
    Float,
    String,
    Timestamp,
    Json,
}

/// A declared field with its default value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub kind: FieldKind,
    #[serde(default)]
    pub default: Value,
}

impl FieldDef {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            default: Value::Null,
        }
    }

    pub fn with_default(kind: FieldKind, default: Value) -> Self {
        Self { kind, default }
    }
}

/// How many targets an association points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    One,
    Many,
}

/// An owned association: targets hold a foreign key back to the owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationDef {
    pub name: String,
    #[serde(rename = "target")]
    pub target_type: String,
    pub cardinality: Cardinality,
    /// Attribute on the target holding the owner id (default `<owner>_id`)
    #[serde(rename = "foreignKey", default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
}

impl AssociationDef {
    pub fn has_many(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_type: target_type.into(),
            cardinality: Cardinality::Many,
            foreign_key: None,
        }
    }

    pub fn has_one(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_type: target_type.into(),
            cardinality: Cardinality::One,
            foreign_key: None,
        }
    }

    pub fn with_foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    /// Foreign key attribute on the target type
    pub fn foreign_key_for(&self, owner_type: &str) -> String {
        match &self.foreign_key {
            Some(key) => key.clone(),
            None => format!("{}_id", to_snake_case(owner_type)),
        }
    }
}

/// Declaration of one entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTypeDef {
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
    #[serde(default)]
    pub associations: Vec<AssociationDef>,
}

impl EntityTypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
            associations: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    pub fn association(mut self, association: AssociationDef) -> Self {
        self.associations.push(association);
        self
    }

    pub fn find_association(&self, name: &str) -> Option<&AssociationDef> {
        self.associations.iter().find(|a| a.name == name)
    }

    /// Declared default for `attribute`, `null` when undeclared
    pub fn default_for(&self, attribute: &str) -> Value {
        self.fields
            .get(attribute)
            .map(|f| f.default.clone())
            .unwrap_or(Value::Null)
    }

    /// Defaults for the given attribute names
    pub fn defaults_for<'a, I>(&self, attributes: I) -> Snapshot
    where
        I: IntoIterator<Item = &'a String>,
    {
        attributes
            .into_iter()
            .map(|name| (name.clone(), self.default_for(name)))
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    types: Vec<EntityTypeDef>,
}

/// Lookup table of entity type declarations
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    types: HashMap<String, EntityTypeDef>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a type declaration
    pub fn register(&mut self, def: EntityTypeDef) -> &mut Self {
        self.types.insert(def.name.clone(), def);
        self
    }

    pub fn with_type(mut self, def: EntityTypeDef) -> Self {
        self.register(def);
        self
    }

    pub fn resolve(&self, entity_type: &str) -> Option<&EntityTypeDef> {
        self.types.get(entity_type)
    }

    /// Like `resolve` but failing with `UnknownEntityType`
    pub fn require(&self, entity_type: &str) -> TrailResult<&EntityTypeDef> {
        self.resolve(entity_type)
            .ok_or_else(|| TrailError::UnknownEntityType(entity_type.to_string()))
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.types.contains_key(entity_type)
    }

    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Parse a registry document: `{"types": [EntityTypeDef, ...]}`
    pub fn from_json(content: &str) -> TrailResult<Self> {
        let file: RegistryFile = serde_json::from_str(content)
            .map_err(|e| TrailError::Config(format!("invalid registry: {}", e)))?;

        let mut registry = Self::new();
        for def in file.types {
            registry.register(def);
        }
        Ok(registry)
    }

    /// Load a registry document, returning an empty registry if the file is missing
    pub fn load<P: AsRef<Path>>(path: P) -> TrailResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Registry file not found, starting empty");
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

/// `LineItem` -> `line_item`
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else if ch == ':' {
            // Namespaced types: `Shop::Order` -> `shop_order`
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("Order"), "order");
        assert_eq!(to_snake_case("LineItem"), "line_item");
        assert_eq!(to_snake_case("Shop::Order"), "shop_order");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_foreign_key_default_and_override() {
        let assoc = AssociationDef::has_many("line_items", "LineItem");
        assert_eq!(assoc.foreign_key_for("Order"), "order_id");

        let assoc = assoc.with_foreign_key("parent_order_id");
        assert_eq!(assoc.foreign_key_for("Order"), "parent_order_id");
    }

    #[test]
    fn test_registry_from_json() {
        let registry = EntityRegistry::from_json(
            r#"{
                "types": [
                    {
                        "name": "Order",
                        "fields": {
                            "status": {"kind": "string", "default": "pending"},
                            "total": {"kind": "integer"}
                        },
                        "associations": [
                            {"name": "line_items", "target": "LineItem", "cardinality": "many"}
                        ]
                    },
                    {"name": "LineItem"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.type_names(), vec!["LineItem", "Order"]);

        let order = registry.require("Order").unwrap();
        assert_eq!(order.default_for("status"), json!("pending"));
        assert_eq!(order.default_for("total"), Value::Null);
        assert_eq!(order.default_for("unknown"), Value::Null);
        assert_eq!(
            order.find_association("line_items").unwrap().cardinality,
            Cardinality::Many
        );

        assert!(matches!(
            registry.require("Invoice").unwrap_err(),
            TrailError::UnknownEntityType(_)
        ));
    }

    #[test]
    fn test_registry_rejects_bad_json() {
        let err = EntityRegistry::from_json("{\"types\": 3}").unwrap_err();
        assert!(matches!(err, TrailError::Config(_)));
    }

    #[test]
    fn test_missing_registry_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = EntityRegistry::load(dir.path().join("nope.json")).unwrap();
        assert!(registry.is_empty());
    }
}
