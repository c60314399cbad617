//! Collection endpoints: trigger a run, inspect task state.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use uuid::Uuid;

use tripatlas_common::DataType;

use super::{bad_request, error_response, not_found, PageQuery};
use crate::AppState;

#[derive(Deserialize)]
pub struct CollectRequest {
    city_name: String,
    data_type: Option<String>,
}

/// Start a background collection. The task id comes back immediately; the
/// run itself is tracked through the task endpoints.
pub async fn api_collect(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CollectRequest>,
) -> impl IntoResponse {
    let data_type = match body.data_type.as_deref() {
        Some(raw) => match DataType::from_str(raw) {
            Ok(data_type) => data_type,
            Err(e) => return error_response(e),
        },
        None => DataType::Attraction,
    };

    match state.collector.start(&body.city_name, data_type).await {
        Ok(task_id) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({"task_id": task_id})),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn api_tasks(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageQuery>,
) -> impl IntoResponse {
    match state.store.list_tasks(params.page(), params.limit()).await {
        Ok((tasks, total)) => Json(serde_json::json!({
            "tasks": tasks,
            "total": total,
            "page": params.page(),
            "limit": params.limit(),
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn api_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Ok(task_id) = Uuid::parse_str(&id) else {
        return bad_request("invalid task id");
    };

    match state.store.get_task(task_id).await {
        Ok(Some(task)) => Json(serde_json::json!({
            "id": task.id,
            "city_name": task.city_name,
            "data_type": task.data_type,
            "status": task.status,
            "progress": task.progress,
            "error": task.error,
            "parse_error": task.parse_error,
            "stats": task.stats,
            "created_at": task.created_at,
            "completed_at": task.completed_at,
        }))
        .into_response(),
        Ok(None) => not_found(format!("task {task_id}")),
        Err(e) => error_response(e),
    }
}

/// Full task row: raw request and response, the append-only step log and
/// the per-attempt api-call log.
pub async fn api_task_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Ok(task_id) = Uuid::parse_str(&id) else {
        return bad_request("invalid task id");
    };

    match state.store.get_task(task_id).await {
        Ok(Some(task)) => Json(task).into_response(),
        Ok(None) => not_found(format!("task {task_id}")),
        Err(e) => error_response(e),
    }
}
