// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron job endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use companion_core::Clock;
use companion_store::{CronJob, CronSchedule};
use serde::Deserialize;
use serde_json::Value;

use super::error::ApiError;
use super::ListenCtx;

pub async fn handle_list(State(ctx): State<Arc<ListenCtx>>) -> Result<Json<Value>, ApiError> {
    Ok(Json(serde_json::json!({"jobs": ctx.cron.jobs()})))
}

/// Create or replace a job by id, re-arming its timer.
pub async fn handle_upsert(
    State(ctx): State<Arc<ListenCtx>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let job: CronJob = serde_json::from_value(body)
        .map_err(|e| ApiError::Validation(format!("invalid cron job: {}", e)))?;
    if job.id.trim().is_empty() {
        return Err(ApiError::Validation("job id is required".to_string()));
    }
    if let CronSchedule::Daily { hour, minute, .. } = &job.schedule {
        if *hour > 23 || *minute > 59 {
            return Err(ApiError::Validation(format!(
                "invalid daily time {:02}:{:02}",
                hour, minute
            )));
        }
    }

    let job = ctx.cron.upsert_job(job);
    ctx.scheduler
        .lock()
        .schedule_job(&job, ctx.clock.now_ms());
    Ok(Json(serde_json::to_value(&job)?))
}

pub async fn handle_delete(
    State(ctx): State<Arc<ListenCtx>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !ctx.cron.remove_job(&id) {
        return Err(ApiError::NotFound(format!("unknown cron job: {}", id)));
    }
    ctx.scheduler.lock().unschedule(&id);
    Ok(Json(serde_json::json!({"ok": true})))
}

pub async fn handle_pending(State(ctx): State<Arc<ListenCtx>>) -> Result<Json<Value>, ApiError> {
    Ok(Json(serde_json::json!({"pending": ctx.cron.pending()})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckBody {
    #[serde(default)]
    pub task_ids: Vec<String>,
}

pub async fn handle_ack(
    State(ctx): State<Arc<ListenCtx>>,
    Json(body): Json<AckBody>,
) -> Result<Json<Value>, ApiError> {
    if body.task_ids.is_empty() {
        return Err(ApiError::Validation("taskIds is required".to_string()));
    }
    let acked = ctx.cron.ack_pending_runs(&body.task_ids);
    Ok(Json(serde_json::json!({"acked": acked})))
}
