// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exec endpoint: happy path, policy gating, validation.

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn exec_happy_path_creates_done_run() {
    let daemon = TestDaemon::start().await;

    let response = daemon
        .post(
            "/api/runtime/exec",
            json!({"command": "printf hello", "timeoutMs": 5000}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["exitCode"], 0);
    assert_eq!(body["stdout"], "hello");
    assert_eq!(body["timedOut"], false);
    let run_id = body["runId"].as_str().unwrap().to_string();

    let runs: serde_json::Value = daemon
        .get("/api/runtime/runs?type=exec")
        .await
        .json()
        .await
        .unwrap();
    let run = runs["runs"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["runId"] == run_id.as_str())
        .expect("run should be recorded");
    assert_eq!(run["type"], "exec");
    assert_eq!(run["state"], "done");

    daemon.stop().await;
}

#[tokio::test]
async fn exec_legacy_alias_routes_equivalently() {
    let daemon = TestDaemon::start().await;
    let response = daemon
        .post(
            "/api/local-runtime/exec",
            json!({"command": "printf alias", "timeoutMs": 5000}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["stdout"], "alias");
    daemon.stop().await;
}

#[tokio::test]
async fn workspace_escape_is_403_with_code() {
    let ws = tempfile::tempdir().unwrap();
    let daemon = TestDaemon::start_with_config(serde_json::json!({
        "port": 0,
        "token": TOKEN,
        "permissionPolicy": {"mode": "workspace", "roots": [ws.path()]}
    }))
    .await;

    let response = daemon
        .post("/api/runtime/exec", json!({"command": "cat /etc/hosts"}))
        .await;
    assert_eq!(response.status(), 403);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "permission_policy_violation");

    daemon.stop().await;
}

#[tokio::test]
async fn workspace_substitution_blocked_full_mode_allows() {
    let ws = tempfile::tempdir().unwrap();
    let restricted = TestDaemon::start_with_config(serde_json::json!({
        "port": 0,
        "token": TOKEN,
        "permissionPolicy": {"mode": "workspace", "roots": [ws.path()]}
    }))
    .await;
    let response = restricted
        .post("/api/runtime/exec", json!({"command": "echo $(whoami)"}))
        .await;
    assert_eq!(response.status(), 403);
    restricted.stop().await;

    let full = TestDaemon::start().await;
    let response = full
        .post(
            "/api/runtime/exec",
            json!({"command": "echo $(printf sub)", "timeoutMs": 5000}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["stdout"], "sub\n");
    full.stop().await;
}

#[tokio::test]
async fn exec_missing_command_is_400() {
    let daemon = TestDaemon::start().await;
    let response = daemon.post("/api/runtime/exec", json!({})).await;
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("command"));
    daemon.stop().await;
}

#[tokio::test]
async fn exec_overlong_command_is_400() {
    let daemon = TestDaemon::start().await;
    let response = daemon
        .post(
            "/api/runtime/exec",
            json!({"command": "x".repeat(10_001)}),
        )
        .await;
    assert_eq!(response.status(), 400);
    daemon.stop().await;
}

#[tokio::test]
async fn exec_nonexistent_cwd_is_400_not_403() {
    let daemon = TestDaemon::start().await;
    let response = daemon
        .post(
            "/api/runtime/exec",
            json!({"command": "true", "cwd": "/definitely/not/here"}),
        )
        .await;
    assert_eq!(response.status(), 400);
    daemon.stop().await;
}

#[tokio::test]
async fn exec_failure_yields_failed_run() {
    let daemon = TestDaemon::start().await;
    let body: serde_json::Value = daemon
        .post("/api/runtime/exec", json!({"command": "exit 3"}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["exitCode"], 3);

    let run: serde_json::Value = daemon
        .get(&format!("/api/runtime/runs/{}", body["runId"].as_str().unwrap()))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(run["state"], "failed");
    assert!(run["finishedAt"].is_u64());
    assert!(run["startedAt"].is_u64());

    daemon.stop().await;
}
