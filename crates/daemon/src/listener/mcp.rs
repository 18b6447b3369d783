// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool-server endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use companion_mcp::SupervisorError;
use serde::Deserialize;
use serde_json::Value;

use super::error::ApiError;
use super::ListenCtx;

pub async fn handle_servers(
    State(ctx): State<Arc<ListenCtx>>,
) -> Result<Json<Value>, ApiError> {
    let servers = ctx.supervisor.list_servers();
    Ok(Json(serde_json::json!({"servers": servers})))
}

pub async fn handle_restart(
    State(ctx): State<Arc<ListenCtx>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match ctx.supervisor.restart_server(&name).await {
        Ok(()) => Ok(Json(serde_json::json!({"ok": true, "server": name}))),
        Err(SupervisorError::UnknownServer(name)) => {
            Err(ApiError::NotFound(format!("unknown tool server: {}", name)))
        }
        Err(e) => Err(ApiError::Validation(e.to_string())),
    }
}

pub async fn handle_tools(State(ctx): State<Arc<ListenCtx>>) -> Result<Json<Value>, ApiError> {
    let tools: Vec<Value> = ctx
        .supervisor
        .list_tools()
        .into_iter()
        .map(|(server, tool)| {
            serde_json::json!({
                "server": server,
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema,
            })
        })
        .collect();
    Ok(Json(serde_json::json!({"tools": tools})))
}

#[derive(Debug, Deserialize)]
pub struct CallBody {
    pub server: Option<String>,
    pub tool: Option<String>,
    #[serde(default)]
    pub arguments: Value,
}

pub async fn handle_call(
    State(ctx): State<Arc<ListenCtx>>,
    Json(body): Json<CallBody>,
) -> Result<Json<Value>, ApiError> {
    let server = body
        .server
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::Validation("server is required".to_string()))?;
    let tool = body
        .tool
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::Validation("tool is required".to_string()))?;

    let outcome = ctx.supervisor.call_tool(&server, &tool, body.arguments).await;
    Ok(Json(serde_json::to_value(&outcome)?))
}
