// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Security policy endpoint: strict updates, persistence.

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn get_reflects_configured_policy() {
    let ws = tempfile::tempdir().unwrap();
    let daemon = TestDaemon::start_with_config(json!({
        "port": 0,
        "token": TOKEN,
        "permissionPolicy": {"mode": "workspace", "roots": [ws.path()]}
    }))
    .await;

    let policy: serde_json::Value = daemon
        .get("/api/security/policy")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(policy["mode"], "workspace");
    assert_eq!(policy["roots"].as_array().unwrap().len(), 1);

    daemon.stop().await;
}

#[tokio::test]
async fn post_updates_and_takes_effect() {
    let daemon = TestDaemon::start().await;

    // Full mode: anything goes
    let response = daemon
        .post("/api/runtime/exec", json!({"command": "cat /etc/hostname"}))
        .await;
    assert_eq!(response.status(), 200);

    let ws = tempfile::tempdir().unwrap();
    let response = daemon
        .post(
            "/api/security/policy",
            json!({"mode": "workspace", "roots": [ws.path()]}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let policy: serde_json::Value = response.json().await.unwrap();
    assert_eq!(policy["mode"], "workspace");

    // The same command is now gated
    let response = daemon
        .post("/api/runtime/exec", json!({"command": "cat /etc/hostname"}))
        .await;
    assert_eq!(response.status(), 403);

    daemon.stop().await;
}

#[tokio::test]
async fn strict_validation_rejects_unknown_mode() {
    let daemon = TestDaemon::start().await;

    let response = daemon
        .post("/api/security/policy", json!({"mode": "chaos"}))
        .await;
    assert_eq!(response.status(), 400);

    let response = daemon
        .post(
            "/api/security/policy",
            json!({"mode": "workspace", "roots": ["not/absolute"]}),
        )
        .await;
    assert_eq!(response.status(), 400);

    daemon.stop().await;
}

#[tokio::test]
async fn unknown_config_mode_normalizes_to_workspace_at_startup() {
    let daemon = TestDaemon::start_with_config(json!({
        "port": 0,
        "token": TOKEN,
        "permissionPolicy": {"mode": "mystery"}
    }))
    .await;

    let policy: serde_json::Value = daemon
        .get("/api/security/policy")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(policy["mode"], "workspace");

    daemon.stop().await;
}
