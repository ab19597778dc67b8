//! REST API module for HTTP endpoints
//!
//! Read-only access to the version trail:
//! - `GET /api/versions` - Search versions with filters and pagination
//! - `GET /api/versions/:id` - Single version with typed snapshots
//! - `GET /api/subjects/:type/:id/latest` - Most recent versions of a subject
//! - `GET /api/subjects/:type/:id/history` - Every version of a subject
//! - `GET /api/subjects/:type/:id/deep` - Versions of a subject and its associations

pub mod subjects;
pub mod versions;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::types::TrailError;

/// Common pagination parameters
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    /// Maximum number of items to return (default: 100, max: 1000)
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Number of items to skip
    #[serde(default)]
    pub offset: usize,
}

pub(crate) fn default_limit() -> usize {
    100
}

/// Upper bound applied to every `limit` parameter
pub const MAX_LIMIT: usize = 1000;

impl PaginationParams {
    /// Normalize limit to max 1000
    pub fn normalized_limit(&self) -> usize {
        self.limit.min(MAX_LIMIT)
    }
}

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Response data
    pub data: T,
    /// Number of versions in the store when the response was built
    #[serde(rename = "versionCount")]
    pub version_count: usize,
    /// Total count (for paginated responses)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T, version_count: usize) -> Self {
        Self {
            data,
            version_count,
            total: None,
        }
    }

    pub fn with_total(data: T, version_count: usize, total: usize) -> Self {
        Self {
            data,
            version_count,
            total: Some(total),
        }
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "NOT_FOUND".to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "BAD_REQUEST".to_string(),
        }
    }

    pub fn data_corruption(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "DATA_CORRUPTION".to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "INTERNAL_ERROR".to_string(),
        }
    }
}

/// An `ApiError` body paired with its status code
#[derive(Debug)]
pub struct ApiFailure(pub StatusCode, pub ApiError);

impl ApiFailure {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, ApiError::bad_request(message))
    }
}

impl From<TrailError> for ApiFailure {
    fn from(err: TrailError) -> Self {
        let message = err.to_string();
        match err {
            e if e.is_not_found() => Self(StatusCode::NOT_FOUND, ApiError::not_found(message)),
            TrailError::DataCorruption { .. } => Self(
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::data_corruption(message),
            ),
            TrailError::Config(_) => Self(StatusCode::BAD_REQUEST, ApiError::bad_request(message)),
            _ => {
                tracing::error!(error = %message, "Request failed");
                Self(StatusCode::INTERNAL_SERVER_ERROR, ApiError::internal(message))
            }
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

/// Handler result: a wrapped payload or an error body
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiFailure>;
