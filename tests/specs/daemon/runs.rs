// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run listings, diagnostics, and durability across restarts.

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn list_filters_and_pages() {
    let daemon = TestDaemon::start().await;
    for command in ["printf a", "printf b", "exit 1"] {
        daemon
            .post("/api/runtime/exec", json!({"command": command}))
            .await;
    }

    let all: serde_json::Value = daemon.get("/api/runtime/runs").await.json().await.unwrap();
    assert_eq!(all["total"], 3);

    let failed: serde_json::Value = daemon
        .get("/api/runtime/runs?state=failed")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(failed["total"], 1);

    let paged: serde_json::Value = daemon
        .get("/api/runtime/runs?limit=2")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(paged["runs"].as_array().unwrap().len(), 2);
    assert_eq!(paged["hasMore"], true);

    let response = daemon.get("/api/runtime/runs?type=mystery").await;
    assert_eq!(response.status(), 400);

    daemon.stop().await;
}

#[tokio::test]
async fn diagnostics_summarize_recent_runs() {
    let daemon = TestDaemon::start().await;
    for _ in 0..3 {
        daemon
            .post("/api/runtime/exec", json!({"command": "true"}))
            .await;
    }
    daemon
        .post("/api/runtime/exec", json!({"command": "exit 1"}))
        .await;

    let diag: serde_json::Value = daemon
        .get("/api/runtime/runs/diagnostics")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(diag["sampled"], 4);
    assert_eq!(diag["completionRate"], 0.75);
    assert_eq!(diag["byType"]["exec"], 4);
    assert_eq!(diag["lastHour"], 4);
    assert!(diag["recent"].as_array().unwrap().len() <= 10);

    daemon.stop().await;
}

#[tokio::test]
async fn runs_survive_daemon_restart() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("companion.json"),
        json!({"port": 0, "token": TOKEN}).to_string(),
    )
    .unwrap();

    let run_id = {
        let result = companion_daemon::startup(&companion_daemon::Config::at(
            dir.path().to_path_buf(),
        ))
        .await
        .unwrap();
        let run = result.ctx.runs.create(companion_store::CreateRun {
            kind: Some(companion_store::RunType::Cron),
            summary: Some("recorded before restart".to_string()),
            ..Default::default()
        });
        companion_daemon::lifecycle::shutdown(&result.ctx).await;
        run.run_id
    };

    let result = companion_daemon::startup(&companion_daemon::Config::at(
        dir.path().to_path_buf(),
    ))
    .await
    .unwrap();
    let recovered = result.ctx.runs.get(&run_id).expect("run should survive restart");
    assert_eq!(recovered.summary.as_deref(), Some("recorded before restart"));
    companion_daemon::lifecycle::shutdown(&result.ctx).await;
}
