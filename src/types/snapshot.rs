//! Snapshot - ordered attribute capture with structural diff
//!
//! A snapshot is the unit stored in every snapshot column of a version
//! record. Values are plain JSON values so nested mappings and sequences
//! round-trip without loss; typing happens on read (see `materialize`).
//! Keys keep insertion order, so related objects appear in the order the
//! policy declared them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{map, Map, Value};

use super::{TrailError, TrailResult};

/// Insertion-ordered mapping from attribute name to value
///
/// Equality ignores key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Map<String, Value>);

impl Snapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert or replace a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> map::Iter<'_> {
        self.0.iter()
    }

    /// Copy of this snapshot without the given keys
    pub fn without<'a, I>(&self, keys: I) -> Snapshot
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = self.clone();
        for key in keys {
            out.0.shift_remove(key);
        }
        out
    }

    /// Copy of this snapshot restricted to the given keys
    pub fn only<'a, I>(&self, keys: I) -> Snapshot
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = Snapshot::new();
        for key in keys {
            if let Some(value) = self.0.get(key) {
                out.0.insert(key.to_string(), value.clone());
            }
        }
        out
    }

    /// Keys whose values differ between `old` and `new`, carrying the new value
    ///
    /// A key present on one side only counts as changed, even when the
    /// present side holds `null`. When the key is missing from `new` the
    /// change is recorded as `null`.
    pub fn diff(old: &Snapshot, new: &Snapshot) -> Snapshot {
        let mut changes = Snapshot::new();

        for (key, new_value) in &new.0 {
            if old.0.get(key) != Some(new_value) {
                changes.0.insert(key.clone(), new_value.clone());
            }
        }

        for key in old.0.keys() {
            if !new.0.contains_key(key) {
                changes.0.insert(key.clone(), Value::Null);
            }
        }

        changes
    }

    /// Encode for a snapshot column; the empty snapshot encodes to `""`
    pub fn serialize(&self) -> TrailResult<String> {
        if self.0.is_empty() {
            return Ok(String::new());
        }
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Decode a snapshot column
    ///
    /// Blank input and `null` decode to the empty snapshot. Anything that is
    /// not a JSON object is reported as corruption.
    pub fn deserialize(raw: &str) -> TrailResult<Snapshot> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Snapshot::new());
        }

        let value: Value =
            serde_json::from_str(trimmed).map_err(|e| TrailError::corruption("snapshot", e))?;
        Snapshot::from_value(value)
    }

    /// Build from an already-decoded JSON value
    pub fn from_value(value: Value) -> TrailResult<Snapshot> {
        match value {
            Value::Null => Ok(Snapshot::new()),
            Value::Object(map) => Ok(Snapshot(map)),
            other => Err(TrailError::corruption(
                "snapshot",
                format!("expected an object, found {}", json_kind(&other)),
            )),
        }
    }

    /// Convert into a JSON object value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl FromIterator<(String, Value)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Snapshot(iter.into_iter().collect())
    }
}

impl IntoIterator for Snapshot {
    type Item = (String, Value);
    type IntoIter = map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = (&'a String, &'a Value);
    type IntoIter = map::Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<BTreeMap<String, Value>> for Snapshot {
    fn from(map: BTreeMap<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Build a snapshot from a `json!({...})` literal (panics on non-objects)
#[cfg(test)]
pub(crate) fn snap(value: Value) -> Snapshot {
    Snapshot::from_value(value).unwrap()
}
