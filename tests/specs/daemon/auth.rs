// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authentication and rate limiting over real HTTP.

use crate::prelude::*;

#[tokio::test]
async fn missing_token_is_401() {
    let daemon = TestDaemon::start().await;
    let response = daemon
        .client
        .get(daemon.url("/healthz"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    daemon.stop().await;
}

#[tokio::test]
async fn wrong_token_is_401() {
    let daemon = TestDaemon::start().await;
    let response = daemon
        .client
        .get(daemon.url("/healthz"))
        .bearer_auth("not-the-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    daemon.stop().await;
}

#[tokio::test]
async fn correct_token_succeeds() {
    let daemon = TestDaemon::start().await;
    let response = daemon.get("/healthz").await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert!(body["pid"].is_u64());
    assert!(body["version"].is_string());
    daemon.stop().await;
}

#[tokio::test]
async fn rate_limit_locks_out_after_twenty_failures() {
    let daemon = TestDaemon::start().await;
    for _ in 0..20 {
        let response = daemon
            .client
            .get(daemon.url("/healthz"))
            .bearer_auth("wrong")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401);
    }

    // The 21st request is refused even with the correct token
    let response = daemon.get("/healthz").await;
    assert_eq!(response.status(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(
        body["error"].as_str().unwrap().contains("too many"),
        "lockout message should be distinct: {body}"
    );
    daemon.stop().await;
}

#[tokio::test]
async fn preflight_succeeds_without_token() {
    let daemon = TestDaemon::start().await;
    let response = daemon
        .client
        .request(reqwest::Method::OPTIONS, daemon.url("/api/runtime/exec"))
        .header("Origin", "chrome-extension://abcdef")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    daemon.stop().await;
}

#[tokio::test]
async fn unknown_route_is_404_when_authed() {
    let daemon = TestDaemon::start().await;
    let response = daemon.get("/api/never/heard/of/it").await;
    assert_eq!(response.status(), 404);
    daemon.stop().await;
}
