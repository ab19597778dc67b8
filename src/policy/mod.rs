//! Tracking Policy - what to capture for an entity type, and when
//!
//! A policy is registered once per entity type. Includes are resolved into
//! `IncludeSpec` values at registration time, and every include key is added
//! to the skip list so the same data never lands in both `object` and
//! `additional_objects`.

mod include;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::entities::EntityState;
use crate::types::{EventSet, Snapshot, VersionEvent};

pub use include::{build_additional_objects, SubjectView};

/// Accessor invoked on the subject to produce an include value
pub type Accessor = Arc<dyn Fn(&SubjectView<'_>) -> Value + Send + Sync>;

/// Predicate over the entity state at hook time
pub type Predicate = Arc<dyn Fn(&EntityState) -> bool + Send + Sync>;

/// How one `additional_objects` key is captured
#[derive(Clone)]
pub enum IncludeSpec {
    /// Value computed by an accessor on the subject
    Accessor(Accessor),
    /// The subject's attribute (or association) of the same name
    RawAttribute,
    /// Each item of the collection of the same name, restricted to `fields`
    CollectionProjection(Vec<String>),
}

impl IncludeSpec {
    pub fn accessor<F>(f: F) -> Self
    where
        F: Fn(&SubjectView<'_>) -> Value + Send + Sync + 'static,
    {
        IncludeSpec::Accessor(Arc::new(f))
    }

    /// Projection over `fields`; an empty field list means the raw attribute
    pub fn projection<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            IncludeSpec::RawAttribute
        } else {
            IncludeSpec::CollectionProjection(fields)
        }
    }
}

impl fmt::Debug for IncludeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncludeSpec::Accessor(_) => f.write_str("Accessor(<fn>)"),
            IncludeSpec::RawAttribute => f.write_str("RawAttribute"),
            IncludeSpec::CollectionProjection(fields) => {
                f.debug_tuple("CollectionProjection").field(fields).finish()
            }
        }
    }
}

#[derive(Clone)]
enum Condition {
    When(Predicate),
    Unless(Predicate),
}

/// Per-entity-type tracking configuration
#[derive(Clone)]
pub struct TrackingPolicy {
    entity_type: String,
    skip: BTreeSet<String>,
    includes: Vec<(String, IncludeSpec)>,
    events: EventSet,
    conditions: Vec<Condition>,
}

impl TrackingPolicy {
    /// Start a policy for `entity_type` tracking all events
    pub fn builder(entity_type: impl Into<String>) -> TrackingPolicyBuilder {
        TrackingPolicyBuilder {
            entity_type: entity_type.into(),
            skip: BTreeSet::new(),
            translated: Vec::new(),
            includes: Vec::new(),
            events: EventSet::all(),
            conditions: Vec::new(),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Skip list, including every include key
    pub fn skip(&self) -> &BTreeSet<String> {
        &self.skip
    }

    pub fn is_skipped(&self, attribute: &str) -> bool {
        self.skip.contains(attribute)
    }

    pub fn includes(&self) -> &[(String, IncludeSpec)] {
        &self.includes
    }

    pub fn events(&self) -> EventSet {
        self.events
    }

    pub fn tracks(&self, event: VersionEvent) -> bool {
        self.events.contains(event)
    }

    /// Whether every `when` holds and no `unless` holds for `state`
    pub fn is_enabled_for(&self, state: &EntityState) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::When(p) => p(state),
            Condition::Unless(p) => !p(state),
        })
    }

    /// `snapshot` with skip-listed keys removed
    pub fn strip_skipped(&self, snapshot: &Snapshot) -> Snapshot {
        snapshot.without(self.skip.iter().map(String::as_str))
    }
}

impl fmt::Debug for TrackingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingPolicy")
            .field("entity_type", &self.entity_type)
            .field("skip", &self.skip)
            .field("includes", &self.includes)
            .field("events", &self.events)
            .field("conditions", &self.conditions.len())
            .finish()
    }
}

/// Builder for `TrackingPolicy`
pub struct TrackingPolicyBuilder {
    entity_type: String,
    skip: BTreeSet<String>,
    translated: Vec<String>,
    includes: Vec<(String, IncludeSpec)>,
    events: EventSet,
    conditions: Vec<Condition>,
}

impl TrackingPolicyBuilder {
    /// Never capture `attribute` in `object` or `object_changes`
    pub fn skip(mut self, attribute: impl Into<String>) -> Self {
        self.skip.insert(attribute.into());
        self
    }

    pub fn skip_all<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip.extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Declare translated attributes; their `<attr>_translations` columns are skipped
    pub fn translated<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.translated.extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Capture `key` in `additional_objects` using `spec`
    pub fn include(mut self, key: impl Into<String>, spec: IncludeSpec) -> Self {
        let key = key.into();
        self.includes.retain(|(existing, _)| *existing != key);
        self.includes.push((key, spec));
        self
    }

    pub fn include_raw(self, key: impl Into<String>) -> Self {
        self.include(key, IncludeSpec::RawAttribute)
    }

    pub fn include_projection<I, S>(self, key: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include(key, IncludeSpec::projection(fields))
    }

    pub fn include_accessor<F>(self, key: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&SubjectView<'_>) -> Value + Send + Sync + 'static,
    {
        self.include(key, IncludeSpec::accessor(accessor))
    }

    /// Restrict tracking to `events`
    pub fn on<I: IntoIterator<Item = VersionEvent>>(mut self, events: I) -> Self {
        self.events = EventSet::only(events);
        self
    }

    /// Only track when `predicate` holds
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&EntityState) -> bool + Send + Sync + 'static,
    {
        self.conditions.push(Condition::When(Arc::new(predicate)));
        self
    }

    /// Skip tracking when `predicate` holds
    pub fn unless<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&EntityState) -> bool + Send + Sync + 'static,
    {
        self.conditions.push(Condition::Unless(Arc::new(predicate)));
        self
    }

    pub fn build(self) -> TrackingPolicy {
        let mut skip = self.skip;
        skip.extend(self.includes.iter().map(|(key, _)| key.clone()));
        skip.extend(self.translated.iter().map(|attr| format!("{}_translations", attr)));

        TrackingPolicy {
            entity_type: self.entity_type,
            skip,
            includes: self.includes,
            events: self.events,
            conditions: self.conditions,
        }
    }
}
