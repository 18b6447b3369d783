// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron jobs: CRUD, firing capture, compaction, ack.

use crate::prelude::*;
use companion_core::Clock;
use companion_daemon::lifecycle;
use serde_json::json;

#[tokio::test]
async fn upsert_list_delete() {
    let daemon = TestDaemon::start().await;

    let response = daemon
        .post(
            "/api/cron/jobs",
            json!({
                "id": "sync",
                "name": "background sync",
                "enabled": true,
                "schedule": {"kind": "interval", "minutes": 15}
            }),
        )
        .await;
    assert_eq!(response.status(), 200);

    let jobs: serde_json::Value = daemon.get("/api/cron/jobs").await.json().await.unwrap();
    assert_eq!(jobs["jobs"].as_array().unwrap().len(), 1);
    assert!(daemon.ctx.scheduler.lock().is_scheduled("sync"));

    let response = daemon.delete("/api/cron/jobs/sync").await;
    assert_eq!(response.status(), 200);
    assert!(!daemon.ctx.scheduler.lock().is_scheduled("sync"));

    let response = daemon.delete("/api/cron/jobs/sync").await;
    assert_eq!(response.status(), 404);

    daemon.stop().await;
}

#[tokio::test]
async fn daily_job_fires_into_pending_and_acks() {
    let daemon = TestDaemon::start().await;

    let response = daemon
        .post(
            "/api/cron/jobs",
            json!({
                "id": "morning",
                "name": "daily report",
                "enabled": true,
                "schedule": {"kind": "daily", "hour": 9, "minute": 30, "tz": "UTC"}
            }),
        )
        .await;
    assert_eq!(response.status(), 200);

    // Force an imminent firing and drain the scheduler like the daemon
    // loop does
    let before = daemon.ctx.clock.now_ms();
    daemon
        .ctx
        .scheduler
        .lock()
        .arm_at("morning", before.saturating_sub(1));
    lifecycle::fire_due_jobs(&daemon.ctx);

    let pending: serde_json::Value = daemon.get("/api/cron/pending").await.json().await.unwrap();
    let entries = pending["pending"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["taskId"], "morning");
    let missed_at = entries[0]["missedAt"].as_u64().unwrap();
    assert!(missed_at >= before && missed_at <= daemon.ctx.clock.now_ms());

    // The job re-armed for its next occurrence
    assert!(daemon.ctx.scheduler.lock().is_scheduled("morning"));

    let response = daemon
        .post("/api/cron/pending/ack", json!({"taskIds": ["morning"]}))
        .await;
    assert_eq!(response.status(), 200);
    let pending: serde_json::Value = daemon.get("/api/cron/pending").await.json().await.unwrap();
    assert!(pending["pending"].as_array().unwrap().is_empty());

    daemon.stop().await;
}

#[tokio::test]
async fn repeated_firings_compact_to_newest() {
    let daemon = TestDaemon::start().await;
    daemon
        .post(
            "/api/cron/jobs",
            json!({
                "id": "noisy",
                "enabled": true,
                "schedule": {"kind": "interval", "minutes": 1}
            }),
        )
        .await;

    for _ in 0..3 {
        daemon
            .ctx
            .scheduler
            .lock()
            .arm_at("noisy", daemon.ctx.clock.now_ms().saturating_sub(1));
        lifecycle::fire_due_jobs(&daemon.ctx);
    }

    let pending: serde_json::Value = daemon.get("/api/cron/pending").await.json().await.unwrap();
    assert_eq!(pending["pending"].as_array().unwrap().len(), 1);

    daemon.stop().await;
}

#[tokio::test]
async fn invalid_jobs_are_rejected() {
    let daemon = TestDaemon::start().await;

    let response = daemon
        .post(
            "/api/cron/jobs",
            json!({"id": "", "schedule": {"kind": "interval", "minutes": 5}}),
        )
        .await;
    assert_eq!(response.status(), 400);

    let response = daemon
        .post(
            "/api/cron/jobs",
            json!({"id": "x", "schedule": {"kind": "daily", "hour": 99, "minute": 0, "tz": "UTC"}}),
        )
        .await;
    assert_eq!(response.status(), 400);

    let response = daemon
        .post(
            "/api/cron/jobs",
            json!({"id": "x", "schedule": {"kind": "weekly"}}),
        )
        .await;
    assert_eq!(response.status(), 400);

    daemon.stop().await;
}
