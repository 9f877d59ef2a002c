// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error codes shared across the HTTP API and WebSocket transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Policy,
    Conflict,
    Upstream,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Validation => 422,
            Self::Policy => 422,
            Self::Conflict => 422,
            Self::Upstream => 503,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Validation => "VALIDATION",
            Self::Policy => "POLICY_VIOLATION",
            Self::Conflict => "CONFLICT",
            Self::Upstream => "UPSTREAM",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API-facing error carrying a code, message, and optional details.
///
/// `Upstream` and `Internal` variants are reported with a correlation id:
/// the full cause goes to the server log, the client sees only the generic
/// message plus the id.
#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Unauthenticated or invalid credential. Details intentionally omitted.
    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized, "unauthorized")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// 404 naming the resource kind that was not found.
    pub fn not_found(kind: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("{kind} not found"))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    /// Security policy rejection, naming the violated rule.
    pub fn policy(rule: impl Into<String>) -> Self {
        Self::new(ErrorCode::Policy, rule)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Upstream failure (runtime, webhook, LLM). Logs the cause with a
    /// correlation id; the client gets a generic message.
    pub fn upstream(cause: impl fmt::Display) -> Self {
        let correlation = uuid::Uuid::new_v4().to_string();
        tracing::error!(%correlation, cause = %cause, "upstream failure");
        Self::new(ErrorCode::Upstream, "upstream service unavailable")
            .with_details(serde_json::json!({ "correlation": correlation }))
    }

    /// Internal failure. Logs the cause with a correlation id; the client
    /// never sees the underlying error.
    pub fn internal(cause: impl fmt::Display) -> Self {
        let correlation = uuid::Uuid::new_v4().to_string();
        tracing::error!(%correlation, cause = %cause, "internal error");
        Self::new(ErrorCode::Internal, "internal error")
            .with_details(serde_json::json!({ "correlation": correlation }))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code.as_str().to_owned(),
                message: self.message,
                details: self.details,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        Self::internal(e)
    }
}

impl From<bollard::errors::Error> for ApiError {
    fn from(e: bollard::errors::Error) -> Self {
        Self::upstream(e)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
