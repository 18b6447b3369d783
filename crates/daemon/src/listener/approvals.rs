// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Approval endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use companion_store::{CreateApproval, Resolution};
use serde::Deserialize;
use serde_json::Value;

use super::error::ApiError;
use super::ListenCtx;

pub async fn handle_create(
    State(ctx): State<Arc<ListenCtx>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let params: CreateApproval = serde_json::from_value(body)
        .map_err(|e| ApiError::Validation(format!("invalid approval: {}", e)))?;
    if params.tool_name.trim().is_empty() {
        return Err(ApiError::Validation("toolName is required".to_string()));
    }
    let record = ctx.approvals.create(params);
    Ok((StatusCode::CREATED, Json(serde_json::to_value(&record)?)))
}

pub async fn handle_pending(
    State(ctx): State<Arc<ListenCtx>>,
) -> Result<Json<Value>, ApiError> {
    let pending = ctx.approvals.list_pending();
    Ok(Json(serde_json::json!({"approvals": pending})))
}

pub async fn handle_get(
    State(ctx): State<Arc<ListenCtx>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = ctx
        .approvals
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("unknown approval: {}", id)))?;
    Ok(Json(serde_json::to_value(&record)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveBody {
    pub resolution: Option<String>,
    #[serde(default)]
    pub resolved_by: Option<String>,
}

pub async fn handle_resolve(
    State(ctx): State<Arc<ListenCtx>>,
    Path(id): Path<String>,
    Json(body): Json<ResolveBody>,
) -> Result<Json<Value>, ApiError> {
    let raw = body
        .resolution
        .ok_or_else(|| ApiError::Validation("resolution is required".to_string()))?;
    let resolution = Resolution::parse(&raw)
        .ok_or_else(|| ApiError::Validation(format!("unknown resolution: {}", raw)))?;

    let record = ctx
        .approvals
        .resolve(&id, resolution, body.resolved_by)
        .ok_or_else(|| ApiError::NotFound(format!("unknown approval: {}", id)))?;
    Ok(Json(serde_json::to_value(&record)?))
}
