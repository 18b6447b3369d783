// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Approval lifecycle over HTTP.

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn create_resolve_round_trip() {
    let daemon = TestDaemon::start().await;

    let response = daemon
        .post(
            "/api/runtime/approvals",
            json!({
                "toolName": "shell",
                "toolPreview": "rm -rf build",
                "riskLevel": "high",
                "channels": ["desktop"]
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let record: serde_json::Value = response.json().await.unwrap();
    assert_eq!(record["status"], "pending");
    let id = record["requestId"].as_str().unwrap().to_string();

    let pending: serde_json::Value = daemon
        .get("/api/runtime/approvals/pending")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(pending["approvals"].as_array().unwrap().len(), 1);

    let resolved: serde_json::Value = daemon
        .post(
            &format!("/api/runtime/approvals/{}/resolve", id),
            json!({"resolution": "approved", "resolvedBy": "alice"}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(resolved["status"], "approved");
    assert_eq!(resolved["resolvedBy"], "alice");

    // Second resolve is an idempotent no-op returning the prior record
    let again: serde_json::Value = daemon
        .post(
            &format!("/api/runtime/approvals/{}/resolve", id),
            json!({"resolution": "rejected"}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(again["status"], "approved");
    assert_eq!(again["resolvedAt"], resolved["resolvedAt"]);

    daemon.stop().await;
}

#[tokio::test]
async fn create_requires_tool_name() {
    let daemon = TestDaemon::start().await;
    let response = daemon
        .post("/api/runtime/approvals", json!({"toolPreview": "x"}))
        .await;
    assert_eq!(response.status(), 400);
    daemon.stop().await;
}

#[tokio::test]
async fn unknown_approval_is_404_bad_resolution_400() {
    let daemon = TestDaemon::start().await;

    let response = daemon.get("/api/runtime/approvals/does-not-exist").await;
    assert_eq!(response.status(), 404);

    let created: serde_json::Value = daemon
        .post("/api/runtime/approvals", json!({"toolName": "t"}))
        .await
        .json()
        .await
        .unwrap();
    let response = daemon
        .post(
            &format!(
                "/api/runtime/approvals/{}/resolve",
                created["requestId"].as_str().unwrap()
            ),
            json!({"resolution": "maybe"}),
        )
        .await;
    assert_eq!(response.status(), 400);

    daemon.stop().await;
}
