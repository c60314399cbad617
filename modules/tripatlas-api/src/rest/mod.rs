pub mod browse;
pub mod collect;
pub mod review;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use tracing::warn;

use tripatlas_common::AtlasError;

/// Shared page/limit query for the list endpoints.
#[derive(Deserialize)]
pub struct PageQuery {
    page: Option<i64>,
    limit: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }
}

/// Map a pipeline or store error onto the wire. Validation is the caller's
/// fault, conflicts mean the resource moved on, anything else is masked.
pub fn error_response(err: AtlasError) -> Response {
    let status = match &err {
        AtlasError::Validation(_) => StatusCode::BAD_REQUEST,
        AtlasError::NotFound(_) => StatusCode::NOT_FOUND,
        AtlasError::Conflict(_) | AtlasError::CollectLockConflict(_) => StatusCode::CONFLICT,
        _ => {
            warn!(error = %err, "Request failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "internal error"})),
            )
                .into_response();
        }
    };
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

pub fn not_found(what: impl std::fmt::Display) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": format!("Not found: {what}")})),
    )
        .into_response()
}

pub fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message})),
    )
        .into_response()
}
