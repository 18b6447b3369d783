// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Permission policy endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use companion_policy::{PolicyInput, PolicyMode};
use serde_json::Value;

use super::error::ApiError;
use super::ListenCtx;

pub async fn handle_get(State(ctx): State<Arc<ListenCtx>>) -> Result<Json<Value>, ApiError> {
    let policy = ctx.policy.lock().clone();
    Ok(Json(serde_json::to_value(&policy)?))
}

/// Replace the policy. Strict normalization: unknown modes and relative
/// roots are rejected with 400.
pub async fn handle_set(
    State(ctx): State<Arc<ListenCtx>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let input: PolicyInput = serde_json::from_value(body)
        .map_err(|e| ApiError::Validation(format!("invalid policy: {}", e)))?;
    let policy = companion_policy::normalize(&input, true)?;

    // Persist the normalized form so a reload sees exactly what is active
    let persisted = PolicyInput {
        mode: Some(
            match policy.mode {
                PolicyMode::Full => "full",
                PolicyMode::Workspace => "workspace",
            }
            .to_string(),
        ),
        roots: Some(
            policy
                .roots
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
        ),
    };
    ctx.config.set_policy_input(persisted);
    *ctx.policy.lock() = policy.clone();

    Ok(Json(serde_json::to_value(&policy)?))
}
