// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::runtime::policy::BindMount;
use crate::runtime::CreateSpec;
use crate::state::AppState;
use crate::store::ContainerRecord;

#[derive(Debug, Deserialize)]
pub struct CreateContainerRequest {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub repo_url: Option<String>,
    /// `KEY=value` assignments.
    #[serde(default)]
    pub env: Vec<String>,
    /// Container ports to expose; host ports come from the configured range.
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub mounts: Vec<BindMount>,
    #[serde(default)]
    pub memory_limit: Option<i64>,
    #[serde(default)]
    pub cpu_quota: Option<i64>,
    #[serde(default)]
    pub cpu_period: Option<i64>,
    #[serde(default)]
    pub pids_limit: Option<i64>,
    #[serde(default)]
    pub user: Option<String>,
    /// Explicit opt-in to a root user; the request is already
    /// authenticated when it reaches the handler.
    #[serde(default)]
    pub allow_root: bool,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Image used when the request does not name one.
const DEFAULT_IMAGE: &str = "berth-workspace:latest";

/// `GET /api/containers` — list the catalog, orphaned records excluded.
pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ContainerRecord>>, ApiError> {
    let records = state.store.list_active_containers().map_err(ApiError::from)?;
    Ok(Json(records))
}

/// `POST /api/containers` — validate against the security policy and
/// create. A container may be created without a repository, yielding an
/// empty workspace.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateContainerRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut spec = CreateSpec::new(
        req.name,
        req.image.unwrap_or_else(|| DEFAULT_IMAGE.to_owned()),
    );
    spec.repo_url = req.repo_url;
    spec.env = req.env;
    spec.expose_ports = req.ports;
    spec.mounts = req.mounts;
    spec.labels = req.labels;
    spec.allow_root = req.allow_root;
    if let Some(memory) = req.memory_limit {
        spec.memory = Some(memory);
    }
    if let Some(quota) = req.cpu_quota {
        spec.cpu_quota = Some(quota);
    }
    if let Some(period) = req.cpu_period {
        spec.cpu_period = Some(period);
    }
    if let Some(pids) = req.pids_limit {
        spec.pids_limit = Some(pids);
    }
    if let Some(user) = req.user {
        spec.user = Some(user);
    }

    let id = state.controller.create(spec).await?;
    Ok(Json(serde_json::json!({ "id": id })))
}

/// `GET /api/containers/{id}`.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ContainerRecord>, ApiError> {
    let record = state
        .store
        .get_container(id)
        .map_err(ApiError::from)?
        .filter(|r| !r.orphaned)
        .ok_or_else(|| ApiError::not_found("container"))?;
    Ok(Json(record))
}

/// `DELETE /api/containers/{id}` — close sessions, remove the container.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.registry.close_all_for(id).await;
    state.monitors.disable(id).await?;
    state.controller.remove(id).await?;
    Ok(Json(serde_json::json!({ "removed": true })))
}

/// `POST /api/containers/{id}/start`.
pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.controller.start(id).await?;
    Ok(Json(serde_json::json!({ "started": true })))
}

#[derive(Debug, Deserialize)]
pub struct StopQuery {
    /// Grace period in seconds before the stop escalates.
    pub grace: Option<u64>,
}

/// `POST /api/containers/{id}/stop`.
pub async fn stop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<StopQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.registry.close_all_for(id).await;
    state.controller.stop(id, query.grace).await?;
    Ok(Json(serde_json::json!({ "stopped": true })))
}

/// `GET /api/containers/{id}/status` — observed runtime status.
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = state.controller.status(id).await?;
    Ok(Json(serde_json::json!({ "status": status })))
}

#[derive(Debug, Deserialize)]
pub struct ExecRequest {
    pub argv: Vec<String>,
}

/// `POST /api/containers/{id}/exec` — run a one-shot command and return
/// its collected output.
pub async fn exec(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ExecRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.argv.is_empty() {
        return Err(ApiError::validation("argv must not be empty"));
    }
    let output = state.controller.exec(id, req.argv).await?;
    Ok(Json(serde_json::json!({ "output": output })))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub tail: Option<usize>,
}

/// `GET /api/containers/{id}/logs`.
pub async fn logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let logs = state
        .controller
        .logs(id, query.tail.unwrap_or(200))
        .await?;
    Ok(Json(serde_json::json!({ "logs": logs })))
}
