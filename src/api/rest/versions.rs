//! Version endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{default_limit, ApiFailure, ApiResponse, ApiResult, MAX_LIMIT};
use crate::api::state::AppState;
use crate::audit::AuditLog;
use crate::types::{EntityId, Materialized, Snapshot, TrailResult, VersionEvent, VersionRecord};
use crate::version_store::VersionFilter;

/// Query parameters for searching versions
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub event: Option<String>,
    pub subject_type: Option<String>,
    pub subject_id: Option<EntityId>,
    pub actor: Option<String>,
    /// Substring over the diff columns
    pub q: Option<String>,
    /// `Type:id` token: restrict to the deep history of that subject
    pub item: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl SearchParams {
    fn filter(&self) -> Result<VersionFilter, ApiFailure> {
        let mut filter = VersionFilter::new();
        if let Some(ref event) = self.event {
            let event: VersionEvent = event
                .parse()
                .map_err(|_| ApiFailure::bad_request(format!("Unknown event '{}'", event)))?;
            filter = filter.event(event);
        }
        if let Some(ref subject_type) = self.subject_type {
            filter = filter.subject_type(subject_type.clone());
        }
        if let Some(subject_id) = self.subject_id {
            filter = filter.subject_id(subject_id);
        }
        if let Some(ref actor) = self.actor {
            filter = filter.actor(actor.clone());
        }
        if let Some(ref q) = self.q {
            filter = filter.text(q.clone());
        }
        Ok(filter)
    }
}

/// A version with its decoded diff columns
#[derive(Debug, Serialize)]
pub struct VersionSummary {
    pub id: u64,
    #[serde(rename = "subjectType")]
    pub subject_type: String,
    #[serde(rename = "subjectId")]
    pub subject_id: EntityId,
    pub event: VersionEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub who: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub object: Option<Snapshot>,
    #[serde(rename = "objectChanges")]
    pub object_changes: Snapshot,
    #[serde(rename = "additionalObjectsChanges")]
    pub additional_objects_changes: Snapshot,
}

impl VersionSummary {
    pub fn build(audit: &AuditLog, record: &VersionRecord) -> TrailResult<Self> {
        let object = if record.object.is_blank() {
            None
        } else {
            Some(record.object()?)
        };

        Ok(Self {
            id: record.id,
            subject_type: record.subject_type.clone(),
            subject_id: record.subject_id,
            event: record.event,
            actor: record.actor.clone(),
            who: audit.who(record),
            created_at: record.created_at,
            object,
            object_changes: record.object_changes()?,
            additional_objects_changes: record.additional_objects_changes()?,
        })
    }

    pub fn build_all(audit: &AuditLog, records: &[Arc<VersionRecord>]) -> TrailResult<Vec<Self>> {
        records.iter().map(|r| Self::build(audit, r)).collect()
    }
}

/// A version with typed snapshots and subject resolution
#[derive(Debug, Serialize)]
pub struct VersionDetail {
    #[serde(flatten)]
    pub summary: VersionSummary,
    #[serde(rename = "itemClass")]
    pub item_class: String,
    /// Whether the subject still exists
    #[serde(rename = "itemPresent")]
    pub item_present: bool,
    #[serde(rename = "objectSnapshot")]
    pub object_snapshot: Option<Materialized>,
    #[serde(rename = "objectSnapshotChanges")]
    pub object_snapshot_changes: Materialized,
    #[serde(rename = "additionalObjectsSnapshot")]
    pub additional_objects_snapshot: Materialized,
    #[serde(rename = "additionalObjectsSnapshotChanges")]
    pub additional_objects_snapshot_changes: Materialized,
}

impl VersionDetail {
    pub fn build(audit: &AuditLog, record: &VersionRecord) -> TrailResult<Self> {
        Ok(Self {
            summary: VersionSummary::build(audit, record)?,
            item_class: audit.item_class_name(record).to_string(),
            item_present: audit.item(record).is_some(),
            object_snapshot: audit.object_snapshot(record)?,
            object_snapshot_changes: audit.object_snapshot_changes(record)?,
            additional_objects_snapshot: audit.additional_objects_snapshot(record)?,
            additional_objects_snapshot_changes: audit.additional_objects_snapshot_changes(record)?,
        })
    }
}

/// GET /api/versions - Search versions
pub async fn search_versions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<VersionSummary>> {
    let filter = params.filter()?;
    let limit = params.limit.min(MAX_LIMIT);

    let page = state
        .audit
        .search(&filter, params.item.as_deref(), Some(limit), params.offset)?;
    let data = VersionSummary::build_all(&state.audit, &page.records)?;

    Ok(Json(ApiResponse::with_total(data, state.version_count(), page.total)))
}

/// GET /api/versions/:id - Single version
pub async fn get_version(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<VersionDetail> {
    let record = state.audit.get(id)?;
    let detail = VersionDetail::build(&state.audit, &record)?;
    Ok(Json(ApiResponse::new(detail, state.version_count())))
}
