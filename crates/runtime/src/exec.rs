// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot command execution.
//!
//! Output is folded into bounded rings. On timeout the child gets
//! SIGTERM, then SIGKILL after a grace period, and the result is marked
//! `timedOut`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::ring::RingBuffer;
use crate::shell::shell_invocation;
use crate::signal::{signal_child, ChildSignal};

/// Grace period between terminate and kill.
pub const KILL_GRACE: Duration = Duration::from_secs(3);

/// Parameters for a one-shot exec.
#[derive(Debug, Clone)]
pub struct ExecParams {
    pub command: String,
    pub cwd: PathBuf,
    pub timeout_ms: u64,
    pub env: HashMap<String, String>,
}

/// Result of a one-shot exec.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResult {
    pub ok: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u64,
}

/// Run a command through the user's shell and collect its output.
pub async fn run_command(params: ExecParams) -> ExecResult {
    let started = Instant::now();
    let (program, args) = shell_invocation(&params.command);

    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .envs(&params.env)
        .current_dir(&params.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return ExecResult {
                ok: false,
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("failed to spawn command: {}", e),
                timed_out: false,
                duration_ms: started.elapsed().as_millis() as u64,
            };
        }
    };
    let pid = child.id().map(|p| p as i32);

    let stdout_ring = Arc::new(Mutex::new(RingBuffer::default()));
    let stderr_ring = Arc::new(Mutex::new(RingBuffer::default()));
    let out_task = child.stdout.take().map(|s| pump(s, Arc::clone(&stdout_ring)));
    let err_task = child.stderr.take().map(|s| pump(s, Arc::clone(&stderr_ring)));

    let mut timed_out = false;
    let wait = child.wait();
    tokio::pin!(wait);
    let status = tokio::select! {
        status = &mut wait => status.ok(),
        _ = tokio::time::sleep(Duration::from_millis(params.timeout_ms)) => {
            timed_out = true;
            signal_child(pid, ChildSignal::Terminate);
            tokio::select! {
                status = &mut wait => status.ok(),
                _ = tokio::time::sleep(KILL_GRACE) => {
                    signal_child(pid, ChildSignal::Kill);
                    wait.await.ok()
                }
            }
        }
    };

    // Pumps end at pipe EOF; drain them so output is complete
    if let Some(task) = out_task {
        let _ = task.await;
    }
    if let Some(task) = err_task {
        let _ = task.await;
    }

    let exit_code = status.and_then(|s| s.code()).unwrap_or(-1);
    let stdout = stdout_ring.lock().contents().to_string();
    let stderr = stderr_ring.lock().contents().to_string();
    ExecResult {
        ok: !timed_out && exit_code == 0,
        exit_code,
        stdout,
        stderr,
        timed_out,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// Copy a child stream into a ring, chunk by chunk.
pub(crate) fn pump<R>(mut reader: R, ring: Arc<Mutex<RingBuffer>>) -> tokio::task::JoinHandle<()>
where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = vec![0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let text = String::from_utf8_lossy(&chunk[..n]);
                    ring.lock().push_str(&text);
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
