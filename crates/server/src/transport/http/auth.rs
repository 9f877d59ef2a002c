// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;
use crate::transport::auth::{bearer_token, verify_request};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: i64,
    pub username: String,
}

/// `POST /api/auth/login` — issue a bearer token for the admin credential.
/// Failures are uniform 401s with no token and no hint at which part of
/// the credential was wrong.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if !state.admin.check(&req.username, &req.password) {
        return Err(ApiError::unauthorized());
    }
    let issued = state.tokens.issue(&req.username).map_err(ApiError::internal)?;
    Ok(Json(LoginResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        username: req.username,
    }))
}

/// `POST /api/auth/logout` — revoke the presented token.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = bearer_token(&headers).ok_or_else(ApiError::unauthorized)?;
    let revoked = state.tokens.revoke(token);
    Ok(Json(serde_json::json!({ "revoked": revoked })))
}

/// `GET /api/auth/verify` — report the authenticated principal.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let claims = verify_request(&state, &headers)?;
    Ok(Json(serde_json::json!({
        "valid": true,
        "username": claims.sub,
        "expires_at": claims.exp,
    })))
}
