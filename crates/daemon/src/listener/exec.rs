// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot exec endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use companion_runtime::{run_command, ExecParams};
use companion_store::{CreateRun, RunState, RunType, UpdateRun};
use serde::Deserialize;
use serde_json::Value;

use super::error::ApiError;
use super::ListenCtx;

/// Maximum accepted command length in characters.
pub const MAX_COMMAND_CHARS: usize = 10_000;

/// Timeout bounds in milliseconds.
pub const MIN_TIMEOUT_MS: u64 = 1_000;
pub const MAX_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecBody {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
}

/// Validate command/timeout and resolve the working directory under the
/// active policy. Shared with session start.
pub(super) fn validate_command(
    ctx: &ListenCtx,
    command: Option<&str>,
    cwd: Option<&str>,
    timeout_ms: Option<u64>,
) -> Result<(String, std::path::PathBuf, u64), ApiError> {
    let command = command.unwrap_or_default().to_string();
    if command.trim().is_empty() {
        return Err(ApiError::Validation("command is required".to_string()));
    }
    if command.chars().count() > MAX_COMMAND_CHARS {
        return Err(ApiError::Validation(format!(
            "command exceeds {} characters",
            MAX_COMMAND_CHARS
        )));
    }
    let timeout_ms = timeout_ms
        .unwrap_or(DEFAULT_TIMEOUT_MS)
        .clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);

    let policy = ctx.policy.lock().clone();
    let resolved_cwd = companion_policy::resolve_cwd(cwd, &policy)?;
    companion_policy::enforce_command_policy(&command, &resolved_cwd, &policy)?;

    Ok((command, resolved_cwd, timeout_ms))
}

pub async fn handle_exec(
    State(ctx): State<Arc<ListenCtx>>,
    Json(body): Json<ExecBody>,
) -> Result<Json<Value>, ApiError> {
    let (command, cwd, timeout_ms) =
        validate_command(&ctx, body.command.as_deref(), body.cwd.as_deref(), body.timeout_ms)?;

    let mut meta = serde_json::Map::new();
    meta.insert("command".to_string(), Value::String(command.clone()));
    let run = ctx.runs.create(CreateRun {
        kind: Some(RunType::Exec),
        state: Some(RunState::Running),
        summary: Some(command.clone()),
        meta: Some(meta),
        ..Default::default()
    });

    let result = run_command(ExecParams {
        command,
        cwd,
        timeout_ms,
        env: body.env.unwrap_or_default(),
    })
    .await;

    let error = if result.timed_out {
        Some("command timed out".to_string())
    } else if !result.ok {
        Some(format!("command exited with code {}", result.exit_code))
    } else {
        None
    };
    ctx.runs.update(
        &run.run_id,
        UpdateRun {
            state: Some(if result.ok {
                RunState::Done
            } else {
                RunState::Failed
            }),
            error,
            ..Default::default()
        },
    );

    let mut payload = serde_json::to_value(&result)?;
    payload["runId"] = Value::String(run.run_id);
    Ok(Json(payload))
}
