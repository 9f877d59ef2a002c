// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::Claims;
use crate::error::ApiError;
use crate::state::AppState;

/// Extract the bearer token from HTTP headers.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Verify the bearer token in `headers` against the token service.
pub fn verify_request(state: &AppState, headers: &HeaderMap) -> Result<Claims, ApiError> {
    let token = bearer_token(headers).ok_or_else(ApiError::unauthorized)?;
    state.tokens.verify(token).ok_or_else(ApiError::unauthorized)
}

/// Validate a token carried in a WebSocket upgrade query string
/// (`?token=...`). Browsers cannot set the Authorization header on
/// upgrades, so the query parameter is the accepted channel there.
pub fn verify_ws_token(state: &AppState, token: Option<&str>) -> Result<Claims, ApiError> {
    let token = token.ok_or_else(ApiError::unauthorized)?;
    state.tokens.verify(token).ok_or_else(ApiError::unauthorized)
}

/// Axum middleware enforcing bearer authentication on every route except
/// login and the WebSocket upgrade (which authenticates from its query
/// string before any frame is exchanged).
pub async fn auth_layer(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path == "/api/auth/login" || path.starts_with("/api/ws/") {
        return next.run(req).await;
    }

    if let Err(err) = verify_request(&state, req.headers()) {
        return err.into_response();
    }
    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
