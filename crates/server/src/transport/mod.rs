// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP API and WebSocket transport.

pub mod auth;
pub mod frames;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Auth (login is public; logout/verify carry a token).
        .route("/api/auth/login", post(http::auth::login))
        .route("/api/auth/logout", post(http::auth::logout))
        .route("/api/auth/verify", get(http::auth::verify))
        // Containers
        .route(
            "/api/containers",
            get(http::containers::list).post(http::containers::create),
        )
        .route(
            "/api/containers/{id}",
            get(http::containers::get).delete(http::containers::remove),
        )
        .route("/api/containers/{id}/start", post(http::containers::start))
        .route("/api/containers/{id}/stop", post(http::containers::stop))
        .route("/api/containers/{id}/status", get(http::containers::status))
        .route("/api/containers/{id}/logs", get(http::containers::logs))
        .route("/api/containers/{id}/exec", post(http::containers::exec))
        // Task queue
        .route(
            "/api/containers/{id}/tasks",
            get(http::tasks::list).post(http::tasks::enqueue),
        )
        .route("/api/tasks/{id}", delete(http::tasks::remove))
        // Terminal sessions
        .route("/api/terminals/{id}/sessions", get(http::terminal::sessions))
        // Monitoring
        .route(
            "/api/monitoring/{id}/config",
            get(http::monitoring::get_config).put(http::monitoring::put_config),
        )
        .route("/api/monitoring/{id}/status", get(http::monitoring::status))
        .route("/api/monitoring/{id}/context", get(http::monitoring::context))
        .route("/api/monitoring/{id}/logs", get(http::monitoring::logs))
        // WebSocket terminal channel
        .route("/api/ws/terminal/{id}", get(ws::ws_handler))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
