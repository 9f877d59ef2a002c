// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::error::ApiError;
use crate::monitor::{MonitorStatus, MonitoringConfig};
use crate::state::AppState;

fn require_container(state: &AppState, id: i64) -> Result<(), ApiError> {
    state
        .store
        .get_container(id)
        .map_err(ApiError::from)?
        .filter(|r| !r.orphaned)
        .ok_or_else(|| ApiError::not_found("container"))?;
    Ok(())
}

/// `GET /api/monitoring/{id}/config`.
pub async fn get_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MonitoringConfig>, ApiError> {
    require_container(&state, id)?;
    let cfg = state
        .store
        .get_monitoring_config(id)
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found("monitoring config"))?;
    Ok(Json(cfg))
}

/// `PUT /api/monitoring/{id}/config` — validate, persist, (re)start.
pub async fn put_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(cfg): Json<MonitoringConfig>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_container(&state, id)?;
    state.monitors.update(id, cfg).await?;
    Ok(Json(serde_json::json!({ "updated": true })))
}

/// `GET /api/monitoring/{id}/status`.
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MonitorStatus>, ApiError> {
    require_container(&state, id)?;
    Ok(Json(state.monitors.status(id).await?))
}

/// `GET /api/monitoring/{id}/context` — current context buffer contents.
pub async fn context(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_container(&state, id)?;
    Ok(Json(serde_json::json!({ "context": state.monitors.context_buffer(id) })))
}

#[derive(Debug, serde::Deserialize)]
pub struct LogQuery {
    pub limit: Option<usize>,
}

/// `GET /api/monitoring/{id}/logs` — automation log, newest first.
pub async fn logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    axum::extract::Query(query): axum::extract::Query<LogQuery>,
) -> Result<Json<Vec<crate::store::AutomationEntry>>, ApiError> {
    require_container(&state, id)?;
    let entries = state
        .store
        .list_automation(id, query.limit.unwrap_or(100).min(1000))
        .map_err(ApiError::from)?;
    Ok(Json(entries))
}
