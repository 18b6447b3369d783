// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness: a real daemon on an ephemeral loopback port.

use std::sync::Arc;
use std::time::Duration;

use companion_daemon::lifecycle;
use companion_daemon::listener::{self, ListenCtx};
use companion_daemon::Config;
use tokio::sync::Notify;

pub const TOKEN: &str = "spec-test-token";

pub struct TestDaemon {
    pub ctx: Arc<ListenCtx>,
    pub base: String,
    pub client: reqwest::Client,
    shutdown: Arc<Notify>,
    _lock: std::fs::File,
    _dir: tempfile::TempDir,
}

impl TestDaemon {
    /// Start with a minimal config (ephemeral port, known token).
    pub async fn start() -> Self {
        Self::start_with_config(serde_json::json!({"port": 0, "token": TOKEN})).await
    }

    /// Start with an explicit `companion.json` body.
    pub async fn start_with_config(config: serde_json::Value) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("companion.json"), config.to_string()).unwrap();

        let result = lifecycle::startup(&Config::at(dir.path().to_path_buf()))
            .await
            .unwrap();
        let addr = result.listener.local_addr().unwrap();

        let shutdown = Arc::new(Notify::new());
        let serve_shutdown = Arc::clone(&shutdown);
        let serve_ctx = Arc::clone(&result.ctx);
        tokio::spawn(async move {
            let wait = async move { serve_shutdown.notified().await };
            let _ = listener::serve(result.listener, serve_ctx, wait).await;
        });
        Self {
            ctx: result.ctx,
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            shutdown,
            _lock: result.lock_file,
            _dir: dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Authenticated GET.
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap()
    }

    /// Authenticated POST with a JSON body.
    pub async fn post(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(TOKEN)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Authenticated DELETE.
    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap()
    }

    pub async fn stop(self) {
        self.shutdown.notify_waiters();
        lifecycle::shutdown(&self.ctx).await;
    }
}

/// Poll until `check` returns `Some`, or panic after ~10s.
pub async fn eventually<T, F, Fut>(mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    for _ in 0..200 {
        if let Some(value) = check().await {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached in time");
}
