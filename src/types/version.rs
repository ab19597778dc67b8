//! Version records - the immutable audit trail entries
//!
//! Snapshot columns are kept in their serialized text form, the way they sit
//! in storage. Decoding happens on access so corrupt bytes surface as
//! `DataCorruption` at read time instead of when the log is opened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::{EntityId, Snapshot, SubjectRef, TrailError, TrailResult, VersionEvent};

/// Keys never reported in `object_changes`
pub const IGNORED_CHANGE_KEYS: [&str; 3] = ["id", "created_at", "updated_at"];

/// A serialized snapshot column
///
/// Loads from either a JSON string holding the encoded snapshot or an
/// inline JSON object, and always writes the string form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredSnapshot(String);

impl StoredSnapshot {
    /// Encode a snapshot for storage
    pub fn encode(snapshot: &Snapshot) -> TrailResult<Self> {
        Ok(Self(snapshot.serialize()?))
    }

    /// Wrap raw column text without validating it
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn raw(&self) -> &str {
        &self.0
    }

    /// Whether the column is absent
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn decode(&self) -> TrailResult<Snapshot> {
        Snapshot::deserialize(&self.0)
    }
}

impl Serialize for StoredSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for StoredSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(text) => Ok(StoredSnapshot(text)),
            Value::Null => Ok(StoredSnapshot::default()),
            inline => Ok(StoredSnapshot(inline.to_string())),
        }
    }
}

/// A version about to be written; the store assigns `id` and `created_at`
#[derive(Debug, Clone, PartialEq)]
pub struct NewVersion {
    pub subject: SubjectRef,
    pub event: VersionEvent,
    pub actor: Option<String>,
    pub object: Option<Snapshot>,
    pub object_changes: Snapshot,
    pub additional_objects: Snapshot,
    pub additional_objects_changes: Snapshot,
}

/// One immutable entry in the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: u64,
    #[serde(rename = "subjectType")]
    pub subject_type: String,
    #[serde(rename = "subjectId")]
    pub subject_id: EntityId,
    pub event: VersionEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default)]
    pub object: StoredSnapshot,
    #[serde(rename = "objectChanges", default)]
    pub object_changes: StoredSnapshot,
    #[serde(rename = "additionalObjects", default)]
    pub additional_objects: StoredSnapshot,
    #[serde(rename = "additionalObjectsChanges", default)]
    pub additional_objects_changes: StoredSnapshot,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl VersionRecord {
    /// Materialize a pending version with its assigned identity
    pub fn from_new(id: u64, created_at: DateTime<Utc>, new: NewVersion) -> TrailResult<Self> {
        let object = match &new.object {
            Some(snapshot) => StoredSnapshot::encode(snapshot)?,
            None => StoredSnapshot::default(),
        };

        Ok(Self {
            id,
            subject_type: new.subject.subject_type,
            subject_id: new.subject.subject_id,
            event: new.event,
            actor: new.actor,
            object,
            object_changes: StoredSnapshot::encode(&new.object_changes)?,
            additional_objects: StoredSnapshot::encode(&new.additional_objects)?,
            additional_objects_changes: StoredSnapshot::encode(&new.additional_objects_changes)?,
            created_at,
        })
    }

    pub fn subject(&self) -> SubjectRef {
        SubjectRef::new(self.subject_type.clone(), self.subject_id)
    }

    /// Pre-event state of the subject (empty for create events)
    pub fn object(&self) -> TrailResult<Snapshot> {
        self.decode_column("object", &self.object)
    }

    /// Changed attributes in new-value form, bookkeeping keys removed
    pub fn object_changes(&self) -> TrailResult<Snapshot> {
        let changes = self.decode_column("object_changes", &self.object_changes)?;
        Ok(changes.without(IGNORED_CHANGE_KEYS))
    }

    pub fn additional_objects(&self) -> TrailResult<Snapshot> {
        self.decode_column("additional_objects", &self.additional_objects)
    }

    pub fn additional_objects_changes(&self) -> TrailResult<Snapshot> {
        self.decode_column("additional_objects_changes", &self.additional_objects_changes)
    }

    /// Case-sensitive substring match over the raw diff columns
    pub fn diff_text_contains(&self, needle: &str) -> bool {
        self.object_changes.raw().contains(needle)
            || self.additional_objects_changes.raw().contains(needle)
    }

    fn decode_column(&self, column: &str, stored: &StoredSnapshot) -> TrailResult<Snapshot> {
        stored.decode().map_err(|e| {
            let location = format!("version {} {}", self.id, column);
            tracing::warn!(version_id = self.id, column, error = %e, "Corrupt snapshot column");
            match e {
                TrailError::DataCorruption { reason, .. } => TrailError::corruption(location, reason),
                other => other,
            }
        })
    }
}
