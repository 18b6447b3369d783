// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run record endpoints (read-only).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use companion_store::{RunFilter, RunState, RunType};
use serde::Deserialize;
use serde_json::Value;

use super::error::ApiError;
use super::ListenCtx;

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn handle_list(
    State(ctx): State<Arc<ListenCtx>>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<Value>, ApiError> {
    let kind = match query.kind.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            RunType::parse(raw)
                .ok_or_else(|| ApiError::Validation(format!("unknown run type: {}", raw)))?,
        ),
        None => None,
    };
    let state = match query.state.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            RunState::parse(raw)
                .ok_or_else(|| ApiError::Validation(format!("unknown run state: {}", raw)))?,
        ),
        None => None,
    };

    let page = ctx.runs.list(&RunFilter {
        kind,
        state,
        offset: query.offset.unwrap_or(0),
        limit: query.limit,
    });
    Ok(Json(serde_json::to_value(&page)?))
}

pub async fn handle_get(
    State(ctx): State<Arc<ListenCtx>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let run = ctx
        .runs
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("unknown run: {}", id)))?;
    Ok(Json(serde_json::to_value(&run)?))
}

#[derive(Debug, Deserialize)]
pub struct DiagnosticsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn handle_diagnostics(
    State(ctx): State<Arc<ListenCtx>>,
    Query(query): Query<DiagnosticsQuery>,
) -> Result<Json<Value>, ApiError> {
    let diagnostics = ctx.runs.diagnostics(query.limit);
    Ok(Json(serde_json::to_value(&diagnostics)?))
}
