// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Origin gate, rate limiting, and bearer-token authentication.
//!
//! Tokens are SHA-256 hashed once at startup; each request hashes the
//! presented token and compares fixed-width digests, so comparison time
//! does not depend on how many prefix bytes match.

use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::ListenCtx;

/// Auth failures allowed inside the sliding window before lockout.
pub const MAX_AUTH_FAILURES: usize = 20;

/// Sliding window for counting failures.
pub const AUTH_FAILURE_WINDOW: Duration = Duration::from_secs(60);

/// Bearer-token state plus the failure window.
pub struct AuthState {
    token_hash: [u8; 32],
    failures: Mutex<VecDeque<Instant>>,
}

impl AuthState {
    pub fn new(token: &str) -> Self {
        Self {
            token_hash: Sha256::digest(token.as_bytes()).into(),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Constant-time token check: both sides are 32-byte digests.
    pub fn verify(&self, presented: Option<&str>) -> bool {
        let Some(presented) = presented else {
            return false;
        };
        let presented_hash: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        presented_hash == self.token_hash
    }

    /// Record one failed authentication at `now`.
    pub fn record_failure(&self) {
        let mut failures = self.failures.lock();
        failures.push_back(Instant::now());
        while failures.len() > MAX_AUTH_FAILURES * 2 {
            failures.pop_front();
        }
    }

    /// True once the window holds at least [`MAX_AUTH_FAILURES`] failures.
    pub fn is_rate_limited(&self) -> bool {
        let now = Instant::now();
        let mut failures = self.failures.lock();
        while failures
            .front()
            .is_some_and(|t| now.duration_since(*t) > AUTH_FAILURE_WINDOW)
        {
            failures.pop_front();
        }
        failures.len() >= MAX_AUTH_FAILURES
    }
}

/// Loopback set: 127.0.0.0/8, `::1`, and v4-mapped loopback.
fn is_loopback(ip: &IpAddr) -> bool {
    ip.to_canonical().is_loopback()
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": message})),
    )
        .into_response()
}

/// Middleware applied to every route.
pub async fn require_auth(
    State(ctx): State<Arc<ListenCtx>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    if !is_loopback(&addr.ip()) {
        return unauthorized("loopback connections only");
    }

    if ctx.auth.is_rate_limited() {
        return unauthorized("too many failed authentication attempts, try again later");
    }

    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));
    if !ctx.auth.verify(token) {
        ctx.auth.record_failure();
        return unauthorized("invalid or missing bearer token");
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
