//! Equality and substring filters over version records
//!
//! Free-text search scans the raw diff columns. Large candidate sets are
//! scanned in parallel.

use std::collections::BTreeSet;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::store::{newest_first, paginate, VersionStore};
use crate::types::{EntityId, SubjectRef, VersionEvent, VersionRecord};

/// Threshold for using parallel search (record count)
const PARALLEL_SEARCH_THRESHOLD: usize = 1000;

/// Simple filters over version record fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionFilter {
    #[serde(default)]
    pub event: Option<VersionEvent>,
    #[serde(rename = "subjectType", default)]
    pub subject_type: Option<String>,
    #[serde(rename = "subjectId", default)]
    pub subject_id: Option<EntityId>,
    #[serde(default)]
    pub actor: Option<String>,
    /// Substring over `object_changes` and `additional_objects_changes`
    #[serde(default)]
    pub text: Option<String>,
}

impl VersionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(mut self, event: VersionEvent) -> Self {
        self.event = Some(event);
        self
    }

    pub fn subject_type(mut self, subject_type: impl Into<String>) -> Self {
        self.subject_type = Some(subject_type.into());
        self
    }

    pub fn subject_id(mut self, subject_id: EntityId) -> Self {
        self.subject_id = Some(subject_id);
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn matches(&self, record: &VersionRecord) -> bool {
        if let Some(event) = self.event {
            if record.event != event {
                return false;
            }
        }
        if let Some(ref subject_type) = self.subject_type {
            if record.subject_type != *subject_type {
                return false;
            }
        }
        if let Some(subject_id) = self.subject_id {
            if record.subject_id != subject_id {
                return false;
            }
        }
        if let Some(ref actor) = self.actor {
            if record.actor.as_deref() != Some(actor.as_str()) {
                return false;
            }
        }
        if let Some(ref text) = self.text {
            if !text.is_empty() && !record.diff_text_contains(text) {
                return false;
            }
        }
        true
    }

    /// Apply to `records`, preserving order
    pub fn apply(&self, records: Vec<Arc<VersionRecord>>) -> Vec<Arc<VersionRecord>> {
        if records.len() > PARALLEL_SEARCH_THRESHOLD {
            records.into_par_iter().filter(|r| self.matches(r)).collect()
        } else {
            records.into_iter().filter(|r| self.matches(r)).collect()
        }
    }
}

/// One page of search results
#[derive(Debug, Clone)]
pub struct VersionPage {
    pub records: Vec<Arc<VersionRecord>>,
    /// Matches before pagination
    pub total: usize,
}

impl VersionStore {
    /// Records matching `filter`, newest first, paginated
    pub fn search(&self, filter: &VersionFilter, limit: Option<usize>, offset: usize) -> VersionPage {
        let candidates = match (&filter.subject_type, filter.subject_id) {
            (Some(subject_type), Some(subject_id)) => {
                self.for_subject(&SubjectRef::new(subject_type.clone(), subject_id), None, 0)
            }
            _ => self.all(),
        };
        Self::page(filter.apply(candidates), limit, offset)
    }

    /// Like `search`, restricted to records of `subjects`
    pub fn search_within(
        &self,
        subjects: &BTreeSet<SubjectRef>,
        filter: &VersionFilter,
        limit: Option<usize>,
        offset: usize,
    ) -> VersionPage {
        let candidates = self.for_subjects(subjects, None, 0);
        Self::page(filter.apply(candidates), limit, offset)
    }

    fn page(mut matched: Vec<Arc<VersionRecord>>, limit: Option<usize>, offset: usize) -> VersionPage {
        matched.sort_by(newest_first);
        let total = matched.len();

        VersionPage {
            records: paginate(matched, limit, offset),
            total,
        }
    }
}
