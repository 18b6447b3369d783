// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Skill bundle extraction endpoints.

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn extract_writes_bundle_and_delete_removes_it() {
    let daemon = TestDaemon::start().await;

    let response = daemon
        .post(
            "/api/skills/extract",
            json!({
                "name": "notes",
                "files": [
                    {"path": "SKILL.md", "content": "# Notes"},
                    {"path": "references/usage.md", "content": "details"}
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["filesWritten"], 2);

    let skill_file = daemon.ctx.skills_dir.join("notes/SKILL.md");
    assert_eq!(std::fs::read_to_string(&skill_file).unwrap(), "# Notes");

    let response = daemon.delete("/api/skills/notes").await;
    assert_eq!(response.status(), 200);
    assert!(!skill_file.exists());

    let response = daemon.delete("/api/skills/notes").await;
    assert_eq!(response.status(), 404);

    daemon.stop().await;
}

#[tokio::test]
async fn traversal_and_absolute_paths_are_rejected() {
    let daemon = TestDaemon::start().await;

    for path in ["../escape.md", "/etc/passwd", "a\\b.md", "a/b/c/d/e.md"] {
        let response = daemon
            .post(
                "/api/skills/extract",
                json!({"name": "bad", "files": [{"path": path, "content": "x"}]}),
            )
            .await;
        assert_eq!(response.status(), 400, "path {path} should be rejected");
    }

    daemon.stop().await;
}

#[tokio::test]
async fn oversize_and_oversized_bundles_are_rejected() {
    let daemon = TestDaemon::start().await;

    let response = daemon
        .post(
            "/api/skills/extract",
            json!({
                "name": "big",
                "files": [{"path": "big.md", "content": "x".repeat(100_001)}]
            }),
        )
        .await;
    assert_eq!(response.status(), 400);

    let files: Vec<serde_json::Value> = (0..51)
        .map(|i| json!({"path": format!("f{i}.md"), "content": "x"}))
        .collect();
    let response = daemon
        .post("/api/skills/extract", json!({"name": "many", "files": files}))
        .await;
    assert_eq!(response.status(), 400);

    daemon.stop().await;
}

#[tokio::test]
async fn skill_name_with_slash_is_rejected() {
    let daemon = TestDaemon::start().await;
    let response = daemon
        .post(
            "/api/skills/extract",
            json!({"name": "../sneaky", "files": [{"path": "a.md", "content": "x"}]}),
        )
        .await;
    assert_eq!(response.status(), 400);
    daemon.stop().await;
}
