// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds for the HTTP surface and their status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use companion_policy::PolicyError;
use companion_runtime::RuntimeError;
use companion_store::StoreError;
use thiserror::Error;

/// Client-visible error kinds.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing/oversize inputs, bad enum values, unknown streams → 400.
    #[error("{0}")]
    Validation(String),

    /// Workspace rule violation → 403 with a machine-readable code.
    #[error("{0}")]
    Policy(String),

    /// Unknown run/session/approval/route → 404.
    #[error("{0}")]
    NotFound(String),

    /// Store or subsystem failure during a handler → 500.
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Validation(message) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({"error": message}),
            ),
            Self::Policy(message) => (
                StatusCode::FORBIDDEN,
                serde_json::json!({"error": message, "code": "permission_policy_violation"}),
            ),
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({"error": message}),
            ),
            Self::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({"error": message}),
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl From<PolicyError> for ApiError {
    fn from(e: PolicyError) -> Self {
        match e {
            PolicyError::Violation(message) => Self::Policy(message),
            PolicyError::Invalid(message) => Self::Validation(message),
        }
    }
}

impl From<RuntimeError> for ApiError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::NotFound(id) => Self::NotFound(format!("unknown session: {}", id)),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Fallback for unmatched routes.
pub async fn handle_not_found() -> ApiError {
    ApiError::NotFound("not found".to_string())
}
