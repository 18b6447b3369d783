// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive sessions: stdin round trip, signals, log paging, events.

use crate::prelude::*;
use serde_json::json;

async fn start_session(daemon: &TestDaemon, command: &str) -> serde_json::Value {
    let response = daemon
        .post(
            "/api/runtime/session/start",
            json!({"command": command, "timeoutMs": 30_000}),
        )
        .await;
    assert_eq!(response.status(), 200);
    response.json().await.unwrap()
}

async fn wait_exited(daemon: &TestDaemon, id: &str) -> serde_json::Value {
    eventually(|| async {
        let session: serde_json::Value = daemon
            .get(&format!("/api/runtime/session/{}", id))
            .await
            .json()
            .await
            .unwrap();
        (session["status"] == "exited").then_some(session)
    })
    .await
}

#[tokio::test]
async fn interactive_write_and_interrupt() {
    let daemon = TestDaemon::start().await;
    let baseline: serde_json::Value = daemon
        .get("/api/runtime/session-events")
        .await
        .json()
        .await
        .unwrap();
    let baseline_cursor = baseline["latestCursor"].as_u64().unwrap();

    let session = start_session(&daemon, "cat").await;
    let id = session["id"].as_str().unwrap().to_string();
    assert_eq!(session["status"], "running");
    assert!(session["runId"].is_string());

    let response = daemon
        .post(
            &format!("/api/runtime/session/{}/write", id),
            json!({"text": "hello", "submit": true}),
        )
        .await;
    assert_eq!(response.status(), 200);

    // cat echoes stdin back
    eventually(|| async {
        let log: serde_json::Value = daemon
            .get(&format!(
                "/api/runtime/sessions/{}/log?stream=stdout&offset=0&limit=1000",
                id
            ))
            .await
            .json()
            .await
            .unwrap();
        log["output"]
            .as_str()
            .unwrap()
            .contains("hello\n")
            .then_some(())
    })
    .await;

    // Give the login shell time to exec cat before signaling
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    let response = daemon
        .post(
            &format!("/api/runtime/session/{}/send-keys", id),
            json!({"keys": "ctrl-c"}),
        )
        .await;
    assert_eq!(response.status(), 200);
    wait_exited(&daemon, &id).await;

    // The exit lands in the event log with a fresh cursor
    let events: serde_json::Value = daemon
        .get(&format!(
            "/api/runtime/session-events?after={}",
            baseline_cursor
        ))
        .await
        .json()
        .await
        .unwrap();
    let found = events["events"]
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["type"] == "session_exited" && e["sessionId"] == id.as_str());
    assert!(found, "session_exited event expected: {events}");

    daemon.stop().await;
}

#[tokio::test]
async fn log_paging_matches_spec_slices() {
    let daemon = TestDaemon::start().await;
    let session = start_session(&daemon, "printf 0123456789; printf abcdefghij >&2").await;
    let id = session["id"].as_str().unwrap().to_string();
    wait_exited(&daemon, &id).await;

    let log: serde_json::Value = daemon
        .get(&format!(
            "/api/runtime/sessions/{}/log?stream=stdout&offset=2&limit=4",
            id
        ))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(log["output"], "2345");
    assert_eq!(log["total"], 10);
    assert_eq!(log["nextOffset"], 6);
    assert_eq!(log["hasMore"], true);

    let both: serde_json::Value = daemon
        .get(&format!(
            "/api/runtime/sessions/{}/log?stream=both&offset=3&limit=4",
            id
        ))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(both["stdout"]["output"], "3456");
    assert_eq!(both["stderr"]["output"], "defg");

    daemon.stop().await;
}

#[tokio::test]
async fn unknown_stream_is_400_unknown_session_404() {
    let daemon = TestDaemon::start().await;
    let session = start_session(&daemon, "true").await;
    let id = session["id"].as_str().unwrap().to_string();

    let response = daemon
        .get(&format!("/api/runtime/sessions/{}/log?stream=mystery", id))
        .await;
    assert_eq!(response.status(), 400);

    let response = daemon
        .get("/api/runtime/sessions/ffffffffffffffffffffffffffffffff/log")
        .await;
    assert_eq!(response.status(), 404);

    let response = daemon
        .get("/api/runtime/session/ffffffffffffffffffffffffffffffff")
        .await;
    assert_eq!(response.status(), 404);

    daemon.stop().await;
}

#[tokio::test]
async fn session_exit_updates_run_record() {
    let daemon = TestDaemon::start().await;
    let session = start_session(&daemon, "printf done").await;
    let id = session["id"].as_str().unwrap().to_string();
    let run_id = session["runId"].as_str().unwrap().to_string();
    wait_exited(&daemon, &id).await;

    let run = eventually(|| async {
        let run: serde_json::Value = daemon
            .get(&format!("/api/runtime/runs/{}", run_id))
            .await
            .json()
            .await
            .unwrap();
        (run["state"] == "done").then_some(run)
    })
    .await;
    assert_eq!(run["type"], "session");
    assert!(run["finishedAt"].is_u64());

    daemon.stop().await;
}

#[tokio::test]
async fn stop_session_with_force() {
    let daemon = TestDaemon::start().await;
    let session = start_session(&daemon, "sleep 30").await;
    let id = session["id"].as_str().unwrap().to_string();

    let response = daemon
        .post(
            &format!("/api/runtime/session/{}/stop", id),
            json!({"force": true}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let exited = wait_exited(&daemon, &id).await;
    assert_ne!(exited["exitCode"], 0);

    daemon.stop().await;
}

#[tokio::test]
async fn session_list_filters_by_status() {
    let daemon = TestDaemon::start().await;
    let done = start_session(&daemon, "true").await;
    wait_exited(&daemon, done["id"].as_str().unwrap()).await;
    let running = start_session(&daemon, "sleep 30").await;

    let list: serde_json::Value = daemon
        .get("/api/runtime/sessions?status=running")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(list["total"], 1);
    assert_eq!(list["sessions"][0]["id"], running["id"]);

    let response = daemon.get("/api/runtime/sessions?status=zombie").await;
    assert_eq!(response.status(), 400);

    let all: serde_json::Value = daemon
        .get("/api/runtime/sessions")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(all["total"], 2);
    // Most recent first: the running session leads
    assert_eq!(all["sessions"][0]["id"], running["id"]);

    daemon
        .post(
            &format!("/api/runtime/session/{}/stop", running["id"].as_str().unwrap()),
            json!({"force": true}),
        )
        .await;
    daemon.stop().await;
}

#[tokio::test]
async fn unknown_send_keys_is_400() {
    let daemon = TestDaemon::start().await;
    let session = start_session(&daemon, "cat").await;
    let id = session["id"].as_str().unwrap().to_string();

    let response = daemon
        .post(
            &format!("/api/runtime/session/{}/send-keys", id),
            json!({"keys": "ctrl-q"}),
        )
        .await;
    assert_eq!(response.status(), 400);

    daemon
        .post(&format!("/api/runtime/session/{}/stop", id), json!({"force": true}))
        .await;
    daemon.stop().await;
}
