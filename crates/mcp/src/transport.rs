// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Newline-delimited JSON-RPC 2.0 over a child's stdio.
//!
//! Wire format: one JSON object per line. Outgoing requests carry a
//! monotonically increasing positive integer id; responses are matched by
//! id and resolve a pending continuation. Empty or non-parseable lines
//! are dropped silently (the child may log to stdout). A late response
//! whose awaiter already timed out is dropped.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, warn};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period between terminate and kill on close.
pub const CLOSE_GRACE: Duration = Duration::from_secs(3);

/// Retained stderr tail after compaction.
const STDERR_KEEP: usize = 10 * 1024;

/// Raw stderr accumulation that triggers compaction.
const STDERR_COMPACT_AT: usize = 20 * 1024;

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Structured JSON-RPC error returned by the tool server.
    #[error("tool server error {code}: {message}")]
    Server {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, TransportError>>>>>;

/// Handler invoked for incoming notifications (method, params).
pub type NotificationHandler = Box<dyn Fn(&str, Value) + Send + Sync>;

/// Exit outcome delivered to the owner once the child terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    /// Process exited; code is `None` when killed by a signal.
    Exited(Option<i32>),
    /// Waiting on the process failed.
    WaitFailed,
}

/// One child process speaking JSON-RPC over its stdio.
pub struct StdioTransport {
    pid: Option<i32>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    pending: PendingMap,
    next_id: AtomicU64,
    stderr: Arc<Mutex<String>>,
    exited: Arc<AtomicBool>,
    exit_notify: Arc<Notify>,
    closed: AtomicBool,
}

impl StdioTransport {
    /// Spawn the child and wire up the reader tasks.
    ///
    /// Spawn failures (e.g. command not found) surface here directly, so
    /// they become start errors rather than handshake timeouts. Returns
    /// the transport and a receiver resolved when the child exits.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        cwd: Option<&std::path::Path>,
        on_notification: Option<NotificationHandler>,
    ) -> Result<(Arc<Self>, oneshot::Receiver<ChildExit>), TransportError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn()?;
        let pid = child.id().map(|p| p as i32);
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let transport = Arc::new(Self {
            pid,
            stdin: tokio::sync::Mutex::new(stdin),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            stderr: Arc::new(Mutex::new(String::new())),
            exited: Arc::new(AtomicBool::new(false)),
            exit_notify: Arc::new(Notify::new()),
            closed: AtomicBool::new(false),
        });

        if let Some(stdout) = stdout {
            let pending = Arc::clone(&transport.pending);
            let handler = on_notification;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    route_frame(&line, &pending, handler.as_deref());
                }
            });
        }

        if let Some(stderr) = stderr {
            let buf = Arc::clone(&transport.stderr);
            tokio::spawn(async move {
                let mut reader = stderr;
                let mut chunk = vec![0u8; 4096];
                loop {
                    match reader.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let text = String::from_utf8_lossy(&chunk[..n]);
                            append_stderr(&buf, &text);
                        }
                    }
                }
            });
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        let pending = Arc::clone(&transport.pending);
        let exited = Arc::clone(&transport.exited);
        let exit_notify = Arc::clone(&transport.exit_notify);
        tokio::spawn(async move {
            let outcome = wait_for_exit(&mut child).await;
            exited.store(true, Ordering::SeqCst);
            exit_notify.notify_waiters();
            reject_all(&pending);
            let _ = exit_tx.send(outcome);
        });

        Ok((transport, exit_rx))
    }

    /// Send a request and await its response.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, TransportError> {
        if self.closed.load(Ordering::SeqCst) || self.exited.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let timeout = timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let frame = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        if let Err(e) = self.write_frame(&frame).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(TransportError::Timeout(timeout))
            }
        }
    }

    /// Send a notification (no id, no response).
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) || self.exited.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let frame = json!({"jsonrpc": "2.0", "method": method, "params": params});
        self.write_frame(&frame).await
    }

    async fn write_frame(&self, frame: &Value) -> Result<(), TransportError> {
        let mut line = serde_json::to_vec(frame)?;
        line.push(b'\n');
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(TransportError::Closed)?;
        stdin.write_all(&line).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Tear down the transport. Idempotent.
    ///
    /// Rejects all pending requests, closes the child's stdin, sends
    /// SIGTERM, and escalates to SIGKILL when the child has not exited
    /// after [`CLOSE_GRACE`].
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        reject_all(&self.pending);
        self.stdin.lock().await.take();

        if self.exited.load(Ordering::SeqCst) {
            return;
        }
        self.terminate(false);

        let exited = Arc::clone(&self.exited);
        let exit_notify = Arc::clone(&self.exit_notify);
        let pid = self.pid;
        tokio::spawn(async move {
            tokio::select! {
                _ = exit_notify.notified() => {}
                _ = tokio::time::sleep(CLOSE_GRACE) => {
                    if !exited.load(Ordering::SeqCst) {
                        send_signal(pid, true);
                    }
                }
            }
        });
    }

    fn terminate(&self, force: bool) {
        send_signal(self.pid, force);
    }

    /// True once the child has exited.
    pub fn is_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Read-only tail of the child's stderr for diagnostics.
    pub fn stderr_tail(&self) -> String {
        self.stderr.lock().clone()
    }
}

/// Dispatch one incoming line: match responses to pending requests, hand
/// notifications to the handler, silently drop everything else.
fn route_frame(line: &str, pending: &PendingMap, handler: Option<&(dyn Fn(&str, Value) + Send + Sync)>) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }
    let Ok(frame) = serde_json::from_str::<Value>(trimmed) else {
        debug!("dropping non-JSON line from tool server stdout");
        return;
    };
    if !frame.is_object() {
        return;
    }

    if let Some(id) = frame.get("id").and_then(Value::as_u64) {
        let Some(tx) = pending.lock().remove(&id) else {
            debug!(id, "dropping late or unknown response");
            return;
        };
        let result = if let Some(error) = frame.get("error").filter(|e| !e.is_null()) {
            Err(TransportError::Server {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
                data: error.get("data").cloned(),
            })
        } else {
            Ok(frame.get("result").cloned().unwrap_or(Value::Null))
        };
        let _ = tx.send(result);
        return;
    }

    if let Some(method) = frame.get("method").and_then(Value::as_str) {
        match handler {
            Some(h) => h(method, frame.get("params").cloned().unwrap_or(Value::Null)),
            None => debug!(method, "dropping notification without handler"),
        }
    }
}

/// Append to the stderr ring, compacting to the newest tail when the raw
/// accumulation grows past the threshold.
fn append_stderr(buf: &Mutex<String>, text: &str) {
    let mut guard = buf.lock();
    guard.push_str(text);
    if guard.len() > STDERR_COMPACT_AT {
        let keep_from = guard.len() - STDERR_KEEP;
        let boundary = (keep_from..guard.len())
            .find(|i| guard.is_char_boundary(*i))
            .unwrap_or(guard.len());
        guard.drain(..boundary);
    }
}

fn reject_all(pending: &PendingMap) {
    let drained: Vec<_> = pending.lock().drain().collect();
    for (_, tx) in drained {
        let _ = tx.send(Err(TransportError::Closed));
    }
}

async fn wait_for_exit(child: &mut Child) -> ChildExit {
    match child.wait().await {
        Ok(status) => ChildExit::Exited(status.code()),
        Err(e) => {
            warn!(error = %e, "failed to wait for tool server child");
            ChildExit::WaitFailed
        }
    }
}

#[cfg(unix)]
fn send_signal(pid: Option<i32>, kill: bool) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    let sig = if kill { Signal::SIGKILL } else { Signal::SIGTERM };
    if let Err(e) = signal::kill(Pid::from_raw(pid), sig) {
        debug!(pid, error = %e, "failed to signal tool server child");
    }
}

#[cfg(not(unix))]
fn send_signal(_pid: Option<i32>, _kill: bool) {}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
