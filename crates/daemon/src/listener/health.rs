// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use companion_core::Clock;
use serde_json::Value;

use super::error::ApiError;
use super::ListenCtx;

pub async fn handle_health(State(ctx): State<Arc<ListenCtx>>) -> Result<Json<Value>, ApiError> {
    let policy = ctx.policy.lock().clone();
    Ok(Json(serde_json::json!({
        "ok": true,
        "ts": ctx.clock.now_ms(),
        "pid": std::process::id(),
        "version": crate::lifecycle::VERSION,
        "uptimeSecs": ctx.start_time.elapsed().as_secs(),
        "mcpServers": ctx.supervisor.server_count(),
        "mcpTools": ctx.supervisor.tool_count(),
        "permissionPolicy": policy,
    })))
}
