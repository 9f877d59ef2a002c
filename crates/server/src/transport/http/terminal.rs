// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::error::ApiError;
use crate::sessions::session::SessionInfo;
use crate::state::AppState;

/// `GET /api/terminals/{id}/sessions` — active PTY sessions for a container.
pub async fn sessions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<SessionInfo>>, ApiError> {
    state
        .store
        .get_container(id)
        .map_err(ApiError::from)?
        .filter(|r| !r.orphaned)
        .ok_or_else(|| ApiError::not_found("container"))?;
    Ok(Json(state.registry.list(id).await))
}
