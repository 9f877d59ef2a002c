// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;
use crate::store::TaskRecord;

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub command: String,
}

/// `GET /api/containers/{id}/tasks`.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<TaskRecord>>, ApiError> {
    let tasks = state.store.list_tasks(id).map_err(ApiError::from)?;
    Ok(Json(tasks))
}

/// `POST /api/containers/{id}/tasks` — enqueue a command for the queue
/// strategy. FIFO per container.
pub async fn enqueue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<EnqueueRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.command.trim().is_empty() {
        return Err(ApiError::validation("command must not be empty"));
    }
    state
        .store
        .get_container(id)
        .map_err(ApiError::from)?
        .filter(|r| !r.orphaned)
        .ok_or_else(|| ApiError::not_found("container"))?;
    let task_id = state
        .store
        .enqueue_task(id, &req.command)
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "id": task_id })))
}

/// `DELETE /api/tasks/{id}`.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state.store.delete_task(id).map_err(ApiError::from)?;
    if !deleted {
        return Err(ApiError::not_found("task"));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
