// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP control plane.
//!
//! A single loopback listener; every request passes the origin gate,
//! the failure-rate limiter, and the constant-time bearer check before
//! reaching a handler. CORS preflight is answered permissively; the
//! real gate is loopback + token.

mod approvals;
mod auth;
mod cron;
mod error;
mod exec;
mod health;
mod mcp;
mod policy;
mod runs;
mod sessions;
mod skills;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use companion_core::Clock;
use companion_mcp::Supervisor;
use companion_policy::PermissionPolicy;
use companion_runtime::SessionManager;
use companion_store::{
    ApprovalStore, ConfigStore, CronStore, RunState, RunStore, UpdateRun,
};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::scheduler::CronScheduler;

pub use auth::AuthState;

/// Default max request body (skill extraction gets its own limit).
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Max request body for skill extraction.
pub const MAX_SKILL_BODY_BYTES: usize = 6 * 1024 * 1024;

/// Shared daemon context for all request handlers.
pub struct ListenCtx {
    pub config: ConfigStore,
    pub runs: RunStore,
    pub approvals: ApprovalStore,
    pub cron: CronStore,
    pub policy: Mutex<PermissionPolicy>,
    pub sessions: SessionManager,
    pub supervisor: Supervisor,
    pub scheduler: Mutex<CronScheduler>,
    /// sessionId → runId, populated before a session spawns so a
    /// fast-exiting session still finds its run.
    pub run_index: Mutex<HashMap<String, String>>,
    pub auth: AuthState,
    pub skills_dir: PathBuf,
    pub clock: Arc<dyn Clock>,
    pub start_time: Instant,
    pub exit_listener: Mutex<Option<companion_runtime::ListenerId>>,
}

/// Wire the session-exit fan-out into the runs store.
///
/// The listener is registered at server construction and detached at
/// shutdown (it closes an `Arc` cycle through the session manager).
pub fn install_exit_listener(ctx: &Arc<ListenCtx>) {
    let shared = Arc::clone(ctx);
    let id = ctx.sessions.add_exit_listener(move |summary| {
        let run_id = shared.run_index.lock().remove(&summary.session_id);
        let Some(run_id) = run_id else { return };

        let ok = !summary.timed_out && summary.exit_code == Some(0);
        let state = if ok { RunState::Done } else { RunState::Failed };
        let error = if summary.timed_out {
            Some("session timed out".to_string())
        } else if !ok {
            Some(format!(
                "session exited with code {}",
                summary.exit_code.unwrap_or(-1)
            ))
        } else {
            None
        };
        shared.runs.update(
            &run_id,
            UpdateRun {
                state: Some(state),
                summary: Some(format!(
                    "session {} exited with code {}",
                    summary.session_id,
                    summary.exit_code.unwrap_or(-1)
                )),
                error,
                ..Default::default()
            },
        );
    });
    *ctx.exit_listener.lock() = Some(id);
}

/// Routes shared by `/api/runtime` and its legacy alias.
fn runtime_routes() -> Router<Arc<ListenCtx>> {
    Router::new()
        .route("/exec", post(exec::handle_exec))
        .route("/session/start", post(sessions::handle_start))
        .route("/session/{id}", get(sessions::handle_get))
        .route("/session/{id}/stop", post(sessions::handle_stop))
        .route("/session/{id}/write", post(sessions::handle_write))
        .route("/session/{id}/send-keys", post(sessions::handle_send_keys))
        .route("/sessions", get(sessions::handle_list))
        .route("/sessions/{id}/log", get(sessions::handle_log))
        .route("/session-events", get(sessions::handle_events))
        .route("/runs", get(runs::handle_list))
        .route("/runs/diagnostics", get(runs::handle_diagnostics))
        .route("/runs/{id}", get(runs::handle_get))
        .route("/approvals", post(approvals::handle_create))
        .route("/approvals/pending", get(approvals::handle_pending))
        .route("/approvals/{id}", get(approvals::handle_get))
        .route("/approvals/{id}/resolve", post(approvals::handle_resolve))
}

/// Build the full route table.
pub fn router(ctx: Arc<ListenCtx>) -> Router {
    Router::new()
        .route("/healthz", get(health::handle_health))
        .nest("/api/runtime", runtime_routes())
        .nest("/api/local-runtime", runtime_routes())
        .route("/api/mcp/servers", get(mcp::handle_servers))
        .route("/api/mcp/servers/{name}/restart", post(mcp::handle_restart))
        .route("/api/mcp/tools", get(mcp::handle_tools))
        .route("/api/mcp/tools/call", post(mcp::handle_call))
        .route(
            "/api/security/policy",
            get(policy::handle_get).post(policy::handle_set),
        )
        .route(
            "/api/cron/jobs",
            get(cron::handle_list).post(cron::handle_upsert),
        )
        .route("/api/cron/jobs/{id}", delete(cron::handle_delete))
        .route("/api/cron/pending", get(cron::handle_pending))
        .route("/api/cron/pending/ack", post(cron::handle_ack))
        .route(
            "/api/skills/extract",
            post(skills::handle_extract).layer(DefaultBodyLimit::max(MAX_SKILL_BODY_BYTES)),
        )
        .route("/api/skills/{name}", delete(skills::handle_delete))
        .fallback(error::handle_not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&ctx),
            auth::require_auth,
        ))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Serve until the shutdown future resolves.
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<ListenCtx>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = router(ctx).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
