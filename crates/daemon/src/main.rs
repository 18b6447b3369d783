// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Companion daemon (companiond)
//!
//! Loopback-only control plane for the browser extension: supervises
//! tool servers, runs shell commands and sessions under the permission
//! policy, schedules recurring jobs, and keeps the durable stores.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::sync::Arc;
use std::time::Duration;

use companion_daemon::lifecycle::{self, Config, LifecycleError, StartupResult};
use companion_daemon::listener;
use tokio::sync::Notify;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("companiond {}", lifecycle::VERSION);
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("companiond {}", lifecycle::VERSION);
                println!("Companion daemon - loopback control plane for the browser extension");
                println!();
                println!("USAGE:");
                println!("    companiond");
                println!();
                println!("The daemon is normally started by the installer or autostart");
                println!("registration and should not need manual invocation. It listens");
                println!("on 127.0.0.1 and requires the bearer token from companion.json.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: companiond [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    rotate_log_if_needed(&config.log_path);

    // Write startup marker to log (before tracing setup, so a supervisor
    // can find where this attempt begins)
    write_startup_marker(&config)?;

    let log_guard = setup_logging(&config)?;

    info!("starting companion daemon");

    let StartupResult {
        ctx,
        listener: tcp_listener,
        lock_file,
    } = match lifecycle::startup(&config).await {
        Ok(r) => r,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(&config.pid_path)
                .unwrap_or_default()
                .trim()
                .to_string();
            eprintln!("companiond is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            // Write error synchronously (tracing is non-blocking and may
            // not flush in time)
            write_startup_error(&config, &e);
            error!("failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };
    // NOTE(lifetime): holds the exclusive pid lock for the process lifetime
    let _lock_file = lock_file;

    let local_addr = tcp_listener.local_addr()?;
    let shutdown = Arc::new(Notify::new());

    // HTTP listener task
    let serve_shutdown = Arc::clone(&shutdown);
    let serve_ctx = Arc::clone(&ctx);
    let server = tokio::spawn(async move {
        let wait = async move { serve_shutdown.notified().await };
        if let Err(e) = listener::serve(tcp_listener, serve_ctx, wait).await {
            error!("listener failed: {}", e);
        }
    });

    lifecycle::spawn_flush_task(Arc::clone(&ctx));
    let pruner = lifecycle::spawn_prune_task(Arc::clone(&ctx));

    #[cfg(unix)]
    let (mut sigterm, mut sigint) = {
        use tokio::signal::unix::{signal, SignalKind};
        (signal(SignalKind::terminate())?, signal(SignalKind::interrupt())?)
    };

    info!("daemon ready, listening on {}", local_addr);
    println!("READY");

    // Scheduler tick (default 1-second resolution). Created outside the
    // loop - select! re-evaluates branches each iteration, so a sleep()
    // inside would reset on every event.
    let mut timer_check = tokio::time::interval(timer_check_interval());

    #[cfg(unix)]
    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down...");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down...");
                break;
            }
            _ = timer_check.tick() => {
                lifecycle::fire_due_jobs(&ctx);
            }
        }
    }

    #[cfg(not(unix))]
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received interrupt, shutting down...");
                break;
            }
            _ = timer_check.tick() => {
                lifecycle::fire_due_jobs(&ctx);
            }
        }
    }

    shutdown.notify_waiters();
    pruner.abort();
    let _ = server.await;
    lifecycle::shutdown(&ctx).await;
    info!("daemon stopped");
    Ok(())
}

/// Scheduler tick interval, configurable via `COMPANION_TIMER_CHECK_MS`
/// (default: 1000ms).
fn timer_check_interval() -> Duration {
    companion_daemon::env::timer_check_ms().unwrap_or(Duration::from_secs(1))
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (companion.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `companion.log` → `companion.log.1` → `.2` → `.3`, deleting
/// the oldest. Best-effort: rotation failures are silently ignored so
/// the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

/// Startup marker prefix written to the log before anything else.
const STARTUP_MARKER_PREFIX: &str = "--- companiond: starting (pid: ";

fn write_startup_marker(config: &Config) -> Result<(), std::io::Error> {
    use std::io::Write;

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(
        file,
        "{}{}) ---\n",
        STARTUP_MARKER_PREFIX,
        std::process::id()
    )?;
    Ok(())
}

/// Write a startup error synchronously so it is visible even if the
/// process exits immediately.
fn write_startup_error(config: &Config, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR failed to start daemon: {}", error);
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let parent = config
        .log_path
        .parent()
        .ok_or("log path has no parent directory")?;
    std::fs::create_dir_all(parent)?;
    let file_name = config
        .log_path
        .file_name()
        .ok_or("log path has no file name")?;

    let file_appender = tracing_appender::rolling::never(parent, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
