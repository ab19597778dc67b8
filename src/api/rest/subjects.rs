//! Subject history endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::versions::VersionSummary;
use super::{default_limit, ApiResponse, ApiResult, PaginationParams, MAX_LIMIT};
use crate::api::state::AppState;
use crate::audit::DEFAULT_LATEST_COUNT;
use crate::types::{EntityId, SubjectRef};

#[derive(Debug, Deserialize)]
pub struct LatestParams {
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_count() -> usize {
    DEFAULT_LATEST_COUNT
}

#[derive(Debug, Deserialize)]
pub struct DeepParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// GET /api/subjects/:type/:id/latest - Most recent versions
pub async fn latest(
    State(state): State<Arc<AppState>>,
    Path((subject_type, subject_id)): Path<(String, EntityId)>,
    Query(params): Query<LatestParams>,
) -> ApiResult<Vec<VersionSummary>> {
    let subject = SubjectRef::new(subject_type, subject_id);
    let records = state.audit.latest(&subject, params.count.min(MAX_LIMIT));
    let data = VersionSummary::build_all(&state.audit, &records)?;
    Ok(Json(ApiResponse::new(data, state.version_count())))
}

/// GET /api/subjects/:type/:id/history - Every version, paginated
pub async fn history(
    State(state): State<Arc<AppState>>,
    Path((subject_type, subject_id)): Path<(String, EntityId)>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Vec<VersionSummary>> {
    let subject = SubjectRef::new(subject_type, subject_id);
    let records = state.audit.history(&subject);
    let total = records.len();

    let page: Vec<_> = records
        .into_iter()
        .skip(params.offset)
        .take(params.normalized_limit())
        .collect();
    let data = VersionSummary::build_all(&state.audit, &page)?;
    Ok(Json(ApiResponse::with_total(data, state.version_count(), total)))
}

/// GET /api/subjects/:type/:id/deep - Versions of the subject and its associations
pub async fn deep(
    State(state): State<Arc<AppState>>,
    Path((subject_type, subject_id)): Path<(String, EntityId)>,
    Query(params): Query<DeepParams>,
) -> ApiResult<Vec<VersionSummary>> {
    let token = SubjectRef::new(subject_type, subject_id).to_string();
    let limit = params.limit.min(MAX_LIMIT);

    let records = state.audit.find_by_composite_key(&token, Some(limit))?;
    let data = VersionSummary::build_all(&state.audit, &records)?;
    Ok(Json(ApiResponse::new(data, state.version_count())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Uri;

    fn deep_params(uri: &str) -> DeepParams {
        let uri: Uri = uri.parse().unwrap();
        Query::<DeepParams>::try_from_uri(&uri).unwrap().0
    }

    #[test]
    fn test_deep_limit_defaults_like_history() {
        assert_eq!(deep_params("/api/subjects/Order/7/deep").limit, default_limit());
        assert_eq!(deep_params("/api/subjects/Order/7/deep?limit=3").limit, 3);
    }
}
