// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive session endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use companion_core::new_hex_id;
use companion_runtime::{LogStream, SessionStatus, StartSession};
use companion_store::{CreateRun, RunState, RunType, UpdateRun};
use serde::Deserialize;
use serde_json::Value;

use super::error::ApiError;
use super::exec::validate_command;
use super::ListenCtx;

/// Default and maximum log slice sizes, in characters.
const DEFAULT_LOG_LIMIT: usize = 10_000;
const MAX_LOG_LIMIT: usize = 200_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBody {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
}

pub async fn handle_start(
    State(ctx): State<Arc<ListenCtx>>,
    Json(body): Json<StartBody>,
) -> Result<Json<Value>, ApiError> {
    let (command, cwd, timeout_ms) =
        validate_command(&ctx, body.command.as_deref(), body.cwd.as_deref(), body.timeout_ms)?;

    // Generate the session id up front so the run index is populated
    // before the child can possibly exit.
    let session_id = new_hex_id();
    let mut meta = serde_json::Map::new();
    meta.insert("sessionId".to_string(), Value::String(session_id.clone()));
    meta.insert("command".to_string(), Value::String(command.clone()));
    let run = ctx.runs.create(CreateRun {
        kind: Some(RunType::Session),
        state: Some(RunState::Running),
        summary: Some(command.clone()),
        meta: Some(meta),
        ..Default::default()
    });
    ctx.run_index
        .lock()
        .insert(session_id.clone(), run.run_id.clone());

    let started = ctx.sessions.start_session(StartSession {
        id: Some(session_id.clone()),
        command,
        cwd,
        timeout_ms,
        env: body.env.unwrap_or_default(),
    });
    let summary = match started {
        Ok(summary) => summary,
        Err(e) => {
            ctx.run_index.lock().remove(&session_id);
            ctx.runs.update(
                &run.run_id,
                UpdateRun {
                    state: Some(RunState::Failed),
                    error: Some(e.to_string()),
                    ..Default::default()
                },
            );
            return Err(e.into());
        }
    };

    let mut payload = serde_json::to_value(&summary)?;
    payload["runId"] = Value::String(run.run_id);
    Ok(Json(payload))
}

pub async fn handle_get(
    State(ctx): State<Arc<ListenCtx>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let summary = ctx
        .sessions
        .get_session(&id)
        .ok_or_else(|| ApiError::NotFound(format!("unknown session: {}", id)))?;
    Ok(Json(serde_json::to_value(&summary)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct StopBody {
    #[serde(default)]
    pub force: bool,
}

pub async fn handle_stop(
    State(ctx): State<Arc<ListenCtx>>,
    Path(id): Path<String>,
    body: Option<Json<StopBody>>,
) -> Result<Json<Value>, ApiError> {
    let force = body.map(|Json(b)| b.force).unwrap_or(false);
    ctx.sessions.stop_session(&id, force)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Debug, Deserialize)]
pub struct WriteBody {
    pub text: Option<String>,
    #[serde(default)]
    pub submit: bool,
}

pub async fn handle_write(
    State(ctx): State<Arc<ListenCtx>>,
    Path(id): Path<String>,
    Json(body): Json<WriteBody>,
) -> Result<Json<Value>, ApiError> {
    let text = body
        .text
        .ok_or_else(|| ApiError::Validation("text is required".to_string()))?;
    ctx.sessions.write_to_session(&id, &text, body.submit).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Debug, Deserialize)]
pub struct SendKeysBody {
    pub keys: Option<String>,
}

pub async fn handle_send_keys(
    State(ctx): State<Arc<ListenCtx>>,
    Path(id): Path<String>,
    Json(body): Json<SendKeysBody>,
) -> Result<Json<Value>, ApiError> {
    let keys = body
        .keys
        .ok_or_else(|| ApiError::Validation("keys is required".to_string()))?;
    ctx.sessions.send_keys(&id, &keys).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn handle_list(
    State(ctx): State<Arc<ListenCtx>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            SessionStatus::parse(raw)
                .ok_or_else(|| ApiError::Validation(format!("unknown status: {}", raw)))?,
        ),
        None => None,
    };
    let page = ctx
        .sessions
        .list_sessions(status, query.offset.unwrap_or(0), query.limit);
    Ok(Json(serde_json::to_value(&page)?))
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn handle_log(
    State(ctx): State<Arc<ListenCtx>>,
    Path(id): Path<String>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Value>, ApiError> {
    let stream = match query.stream.as_deref() {
        None | Some("") => LogStream::Stdout,
        Some(raw) => LogStream::parse(raw)
            .ok_or_else(|| ApiError::Validation(format!("unknown stream: {}", raw)))?,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    let slice = ctx
        .sessions
        .get_log(&id, stream, query.offset.unwrap_or(0), limit)?;
    Ok(Json(serde_json::to_value(&slice)?))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub after: Option<u64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn handle_events(
    State(ctx): State<Arc<ListenCtx>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Value>, ApiError> {
    let events = ctx
        .sessions
        .list_events(query.after.unwrap_or(0), query.limit);
    Ok(Json(serde_json::json!({
        "events": events,
        "latestCursor": ctx.sessions.latest_cursor(),
    })))
}
