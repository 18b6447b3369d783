// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use companion_core::{Clock, SystemClock};
use companion_mcp::{ServerSpec, Supervisor};
use companion_policy::PermissionPolicy;
use companion_runtime::{SessionManager, SessionManagerConfig};
use companion_store::{ApprovalStore, ConfigStore, CronStore, RunStore, StoreError};
use fs2::FileExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::env;
use crate::listener::{AuthState, ListenCtx};
use crate::scheduler::CronScheduler;

/// Daemon version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors during daemon startup and shutdown.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot determine config directory")]
    NoConfigDir,

    #[error("another daemon already holds the lock at {0}")]
    LockFailed(PathBuf),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Daemon configuration: fixed file locations under the config dir.
#[derive(Debug, Clone)]
pub struct Config {
    /// Per-user config directory (owner-only mode).
    pub config_dir: PathBuf,
    /// Path to lock/PID file
    pub pid_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Path to the runs store
    pub runs_path: PathBuf,
    /// Path to the approvals store
    pub approvals_path: PathBuf,
    /// Path to the cron store
    pub cron_path: PathBuf,
    /// Directory for extracted skill bundles
    pub skills_dir: PathBuf,
}

impl Config {
    /// Load configuration for the user-level daemon.
    pub fn load() -> Result<Self, LifecycleError> {
        Ok(Self::at(env::config_dir()?))
    }

    /// Configuration rooted at an explicit directory (tests use this).
    pub fn at(config_dir: PathBuf) -> Self {
        Self {
            pid_path: config_dir.join("companion.pid"),
            log_path: config_dir.join("companion.log"),
            runs_path: config_dir.join("runs.json"),
            approvals_path: config_dir.join("approvals.json"),
            cron_path: config_dir.join("cron-jobs.json"),
            skills_dir: config_dir.join("skills"),
            config_dir,
        }
    }
}

/// Result of daemon startup: the shared context and the bound socket.
pub struct StartupResult {
    pub ctx: Arc<ListenCtx>,
    pub listener: TcpListener,
    // NOTE(lifetime): held to maintain the exclusive pid lock; released on drop
    pub lock_file: File,
}

/// Bring the daemon up: stores, pid lock, policy, supervisor, scheduler,
/// and the loopback socket. Tool servers are started before returning;
/// individual failures do not abort startup.
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    let store = ConfigStore::init(&config.config_dir)?;
    let lock_file = acquire_pid_lock(&config.pid_path)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let runs = RunStore::load(config.runs_path.clone(), Arc::clone(&clock));
    let approvals = ApprovalStore::load(config.approvals_path.clone(), Arc::clone(&clock));
    let cron = CronStore::load(config.cron_path.clone(), Arc::clone(&clock));

    let policy = companion_policy::normalize(&store.policy_input(), false)
        .unwrap_or_else(|_| PermissionPolicy::default());

    let servers = store
        .tool_servers()
        .into_iter()
        .map(|(name, decl)| {
            (
                name,
                ServerSpec {
                    command: decl.command,
                    args: decl.args,
                    env: decl.env.into_iter().collect(),
                    cwd: decl.cwd,
                },
            )
        })
        .collect();
    let supervisor = Supervisor::new(servers, VERSION);

    let sessions = SessionManager::new(SessionManagerConfig::default(), Arc::clone(&clock));

    let mut scheduler = CronScheduler::new();
    let now = clock.now_ms();
    for job in cron.jobs() {
        scheduler.schedule_job(&job, now);
    }

    let auth = AuthState::new(&store.token());
    let port = store.port();

    let ctx = Arc::new(ListenCtx {
        config: store,
        runs,
        approvals,
        cron,
        policy: Mutex::new(policy),
        sessions,
        supervisor,
        scheduler: Mutex::new(scheduler),
        run_index: Mutex::new(std::collections::HashMap::new()),
        auth,
        skills_dir: config.skills_dir.clone(),
        clock,
        start_time: std::time::Instant::now(),
        exit_listener: Mutex::new(None),
    });
    crate::listener::install_exit_listener(&ctx);

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| LifecycleError::Bind { addr, source })?;

    ctx.supervisor.start_all().await;

    Ok(StartupResult {
        ctx,
        listener,
        lock_file,
    })
}

/// Acquire the exclusive pid-file lock, writing our pid into it.
fn acquire_pid_lock(path: &std::path::Path) -> Result<File, LifecycleError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    file.try_lock_exclusive()
        .map_err(|_| LifecycleError::LockFailed(path.to_path_buf()))?;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    companion_store::persist::set_mode(path, 0o600);
    Ok(file)
}

/// Graceful shutdown: detach the exit listener, terminate live sessions,
/// close tool servers, and flush all stores.
pub async fn shutdown(ctx: &ListenCtx) {
    if let Some(id) = ctx.exit_listener.lock().take() {
        ctx.sessions.remove_exit_listener(id);
    }
    ctx.sessions.stop_all();
    ctx.supervisor.shutdown().await;
    flush_all(ctx);
    info!("shutdown complete");
}

/// Drain due cron firings: record a pending marker for each and re-arm.
///
/// Firing never executes anything; the extension consumes pending
/// markers by polling and acking.
pub fn fire_due_jobs(ctx: &ListenCtx) {
    let now = ctx.clock.now_ms();
    let due = ctx.scheduler.lock().fired(now);
    for id in due {
        ctx.cron.add_pending_run(&id);
        if let Some(job) = ctx.cron.get_job(&id) {
            ctx.scheduler.lock().schedule_job(&job, now);
        }
        info!(job = %id, "cron job fired, pending marker recorded");
    }
}

/// Interval for the background session pruner.
pub const PRUNE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Spawn the task that prunes expired and over-cap sessions.
pub fn spawn_prune_task(ctx: Arc<ListenCtx>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            ctx.sessions.prune(0);
        }
    })
}

/// Flush interval for the debounced stores.
pub const FLUSH_INTERVAL: std::time::Duration = std::time::Duration::from_millis(250);

/// Spawn the task that periodically folds dirty stores to disk.
pub fn spawn_flush_task(ctx: Arc<ListenCtx>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(FLUSH_INTERVAL);
        loop {
            interval.tick().await;
            let dirty = ctx.config.needs_flush()
                || ctx.runs.needs_flush()
                || ctx.approvals.needs_flush()
                || ctx.cron.needs_flush();
            if dirty {
                flush_all(&ctx);
            }
        }
    })
}

/// Flush every dirty store, logging failures.
pub fn flush_all(ctx: &ListenCtx) {
    for (name, result) in [
        ("config", ctx.config.flush()),
        ("runs", ctx.runs.flush()),
        ("approvals", ctx.approvals.flush()),
        ("cron", ctx.cron.flush()),
    ] {
        if let Err(e) = result {
            warn!(store = name, error = %e, "failed to flush store");
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
