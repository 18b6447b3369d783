// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive session manager.
//!
//! Owns the live session set: spawn, stdin writes, key injection, stop
//! with terminate→kill escalation, log paging, exit fan-out, and pruning.
//! Sessions exclusively own their child process; only the manager signals
//! or closes it.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use companion_core::{new_hex_id, Clock};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};

use crate::events::{SessionEvent, SessionEventLog, SessionExitSummary};
use crate::exec::pump;
use crate::ring::{RingBuffer, RingSlice};
use crate::session::{LogSlice, LogStream, SessionPage, SessionRecord, SessionStatus, SessionSummary};
use crate::shell::shell_invocation;
use crate::signal::{signal_child, ChildSignal};
use crate::RuntimeError;

/// Grace period between terminate and kill when stopping a session.
pub const STOP_GRACE: Duration = Duration::from_secs(3);

/// Handle returned by [`SessionManager::add_exit_listener`].
pub type ListenerId = u64;

type ExitListener = Arc<dyn Fn(&SessionExitSummary) + Send + Sync>;
type SharedRecord = Arc<Mutex<SessionRecord>>;
type SharedStdin = Arc<tokio::sync::Mutex<Option<ChildStdin>>>;

/// Tunables for the session set.
#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    /// Maximum live + retained sessions.
    pub max_sessions: usize,
    /// Age after which exited sessions are pruned.
    pub exited_ttl_ms: u64,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            max_sessions: 200,
            exited_ttl_ms: 3_600_000,
        }
    }
}

/// Parameters for starting a session.
#[derive(Debug, Clone)]
pub struct StartSession {
    /// Pre-generated id, so callers can index the session before spawn.
    pub id: Option<String>,
    pub command: String,
    pub cwd: PathBuf,
    pub timeout_ms: u64,
    pub env: HashMap<String, String>,
}

#[derive(Clone)]
struct SessionHandle {
    record: SharedRecord,
    stdin: SharedStdin,
}

/// The live session set.
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<String, SessionHandle>>>,
    events: Arc<Mutex<SessionEventLog>>,
    listeners: Arc<Mutex<HashMap<ListenerId, ExitListener>>>,
    next_listener: AtomicU64,
    clock: Arc<dyn Clock>,
    config: SessionManagerConfig,
}

impl SessionManager {
    pub fn new(config: SessionManagerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            events: Arc::new(Mutex::new(SessionEventLog::new())),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_listener: AtomicU64::new(0),
            clock,
            config,
        }
    }

    /// Spawn an interactive session. Prunes synchronously first so the
    /// set stays bounded.
    pub fn start_session(&self, params: StartSession) -> Result<SessionSummary, RuntimeError> {
        self.prune(1);

        let (program, args) = shell_invocation(&params.command);
        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .envs(&params.env)
            .current_dir(&params.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| RuntimeError::Spawn(e.to_string()))?;
        let pid = child.id().map(|p| p as i32);
        let id = params.id.filter(|s| !s.is_empty()).unwrap_or_else(new_hex_id);

        let stdout_ring = Arc::new(Mutex::new(RingBuffer::default()));
        let stderr_ring = Arc::new(Mutex::new(RingBuffer::default()));
        let out_task = child.stdout.take().map(|s| pump(s, Arc::clone(&stdout_ring)));
        let err_task = child.stderr.take().map(|s| pump(s, Arc::clone(&stderr_ring)));
        let stdin: SharedStdin = Arc::new(tokio::sync::Mutex::new(child.stdin.take()));

        let record = SessionRecord {
            id: id.clone(),
            command: params.command,
            cwd: params.cwd,
            timeout_ms: params.timeout_ms,
            status: SessionStatus::Running,
            stdout: stdout_ring,
            stderr: stderr_ring,
            timed_out: false,
            exit_code: None,
            started_at: self.clock.now_ms(),
            finished_at: None,
            pid,
        };
        let summary = record.summary();
        let handle = SessionHandle {
            record: Arc::new(Mutex::new(record)),
            stdin: Arc::clone(&stdin),
        };
        self.sessions.lock().insert(id.clone(), handle.clone());

        // Supervise: enforce the timeout, then finalize exactly once.
        let timeout = Duration::from_millis(params.timeout_ms);
        let record = handle.record;
        let events = Arc::clone(&self.events);
        let listeners = Arc::clone(&self.listeners);
        let clock = Arc::clone(&self.clock);
        tokio::spawn(async move {
            let wait = child.wait();
            tokio::pin!(wait);
            let status = tokio::select! {
                status = &mut wait => status.ok(),
                _ = tokio::time::sleep(timeout) => {
                    record.lock().timed_out = true;
                    signal_child(pid, ChildSignal::Terminate);
                    tokio::select! {
                        status = &mut wait => status.ok(),
                        _ = tokio::time::sleep(STOP_GRACE) => {
                            signal_child(pid, ChildSignal::Kill);
                            wait.await.ok()
                        }
                    }
                }
            };

            // Drain output pumps before the exit snapshot is taken
            if let Some(task) = out_task {
                let _ = task.await;
            }
            if let Some(task) = err_task {
                let _ = task.await;
            }
            stdin.lock().await.take();

            let exit_code = status.and_then(|s| s.code()).unwrap_or(-1);
            finalize(&record, exit_code, &clock, &events, &listeners);
        });

        Ok(summary)
    }

    fn handle(&self, id: &str) -> Result<SessionHandle, RuntimeError> {
        self.sessions
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }

    /// Write UTF-8 text to the session's stdin; `submit` appends a newline.
    pub async fn write_to_session(
        &self,
        id: &str,
        text: &str,
        submit: bool,
    ) -> Result<(), RuntimeError> {
        let handle = self.handle(id)?;
        if handle.record.lock().status != SessionStatus::Running {
            return Err(RuntimeError::NotRunning(id.to_string()));
        }

        let mut bytes = text.as_bytes().to_vec();
        if submit {
            bytes.push(b'\n');
        }

        let mut guard = handle.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| RuntimeError::StdinClosed(id.to_string()))?;
        stdin
            .write_all(&bytes)
            .await
            .map_err(|_| RuntimeError::StdinClosed(id.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|_| RuntimeError::StdinClosed(id.to_string()))?;
        Ok(())
    }

    /// Inject a named key: control signals, stdin close, or literal bytes.
    pub async fn send_keys(&self, id: &str, key: &str) -> Result<(), RuntimeError> {
        let handle = self.handle(id)?;
        let (status, pid) = {
            let record = handle.record.lock();
            (record.status, record.pid)
        };
        if status != SessionStatus::Running {
            return Err(RuntimeError::NotRunning(id.to_string()));
        }

        match key.to_lowercase().as_str() {
            "ctrl-c" => {
                signal_child(pid, ChildSignal::Interrupt);
                Ok(())
            }
            "ctrl-z" => {
                signal_child(pid, ChildSignal::Suspend);
                Ok(())
            }
            "ctrl-d" => {
                handle.stdin.lock().await.take();
                Ok(())
            }
            "enter" => self.write_to_session(id, "\n", false).await,
            "tab" => self.write_to_session(id, "\t", false).await,
            "escape" | "esc" => self.write_to_session(id, "\x1b", false).await,
            other => Err(RuntimeError::UnknownKey(other.to_string())),
        }
    }

    /// Stop a session. Escalates terminate→kill after [`STOP_GRACE`]
    /// unless `force` requests an immediate kill. Idempotent.
    pub fn stop_session(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        let handle = self.handle(id)?;
        let (status, pid) = {
            let record = handle.record.lock();
            (record.status, record.pid)
        };
        if status != SessionStatus::Running {
            return Ok(());
        }

        if force {
            signal_child(pid, ChildSignal::Kill);
            return Ok(());
        }

        signal_child(pid, ChildSignal::Terminate);
        let record = handle.record;
        tokio::spawn(async move {
            tokio::time::sleep(STOP_GRACE).await;
            let still_running = record.lock().status == SessionStatus::Running;
            if still_running {
                signal_child(pid, ChildSignal::Kill);
            }
        });
        Ok(())
    }

    pub fn get_session(&self, id: &str) -> Option<SessionSummary> {
        let handle = self.sessions.lock().get(id).cloned()?;
        let summary = handle.record.lock().summary();
        Some(summary)
    }

    /// Light snapshots sorted most-recent first, with paging.
    pub fn list_sessions(
        &self,
        status: Option<SessionStatus>,
        offset: usize,
        limit: Option<usize>,
    ) -> SessionPage {
        let limit = limit.unwrap_or(50).clamp(1, 500);
        let mut summaries: Vec<(u64, SessionSummary)> = self
            .sessions
            .lock()
            .values()
            .map(|h| {
                let record = h.record.lock();
                (record.recency(), record.summary())
            })
            .filter(|(_, s)| status.is_none_or(|want| s.status == want))
            .collect();
        summaries.sort_by_key(|(recency, s)| std::cmp::Reverse((*recency, s.started_at)));

        let total = summaries.len();
        let page: Vec<SessionSummary> = summaries
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, s)| s)
            .collect();
        let has_more = offset + page.len() < total;
        SessionPage {
            sessions: page,
            total,
            offset,
            limit,
            has_more,
        }
    }

    /// Exact slice of one (or both) output streams.
    pub fn get_log(
        &self,
        id: &str,
        stream: LogStream,
        offset: usize,
        limit: usize,
    ) -> Result<LogSlice, RuntimeError> {
        let handle = self.handle(id)?;
        let record = handle.record.lock();
        let slice = |ring: &Arc<Mutex<RingBuffer>>| -> RingSlice { ring.lock().slice(offset, limit) };
        Ok(match stream {
            LogStream::Stdout => LogSlice::Single(slice(&record.stdout)),
            LogStream::Stderr => LogSlice::Single(slice(&record.stderr)),
            LogStream::Both => LogSlice::Both {
                stdout: slice(&record.stdout),
                stderr: slice(&record.stderr),
            },
        })
    }

    /// Session-exit events after the given cursor.
    pub fn list_events(&self, after: u64, limit: Option<usize>) -> Vec<SessionEvent> {
        let limit = limit.unwrap_or(100).clamp(1, 500);
        self.events.lock().list_after(after, limit)
    }

    pub fn latest_cursor(&self) -> u64 {
        self.events.lock().latest_cursor()
    }

    /// Register an exit listener. Listener panics are swallowed.
    pub fn add_exit_listener(
        &self,
        listener: impl Fn(&SessionExitSummary) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst) + 1;
        self.listeners.lock().insert(id, Arc::new(listener));
        id
    }

    pub fn remove_exit_listener(&self, id: ListenerId) {
        self.listeners.lock().remove(&id);
    }

    /// Drop exited sessions past the TTL, then enforce the cap by
    /// dropping the oldest entries. Running casualties are killed.
    /// `headroom` reserves slots for sessions about to be inserted.
    pub fn prune(&self, headroom: usize) {
        let now = self.clock.now_ms();
        let mut sessions = self.sessions.lock();

        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, h)| {
                let record = h.record.lock();
                record.status == SessionStatus::Exited
                    && record
                        .finished_at
                        .is_some_and(|at| now.saturating_sub(at) >= self.config.exited_ttl_ms)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            sessions.remove(&id);
        }

        let cap = self.config.max_sessions.saturating_sub(headroom);
        while sessions.len() > cap {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, h)| h.record.lock().started_at)
                .map(|(id, _)| id.clone());
            let Some(id) = oldest else { break };
            if let Some(handle) = sessions.remove(&id) {
                let record = handle.record.lock();
                if record.status == SessionStatus::Running {
                    signal_child(record.pid, ChildSignal::Kill);
                }
            }
        }
    }

    /// Terminate all running sessions. Used at daemon shutdown.
    pub fn stop_all(&self) {
        let sessions = self.sessions.lock();
        for handle in sessions.values() {
            let record = handle.record.lock();
            if record.status == SessionStatus::Running {
                signal_child(record.pid, ChildSignal::Terminate);
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

/// Finalize a session exactly once: freeze the record, append the exit
/// event, and fan out to listeners.
fn finalize(
    record: &SharedRecord,
    exit_code: i32,
    clock: &Arc<dyn Clock>,
    events: &Arc<Mutex<SessionEventLog>>,
    listeners: &Arc<Mutex<HashMap<ListenerId, ExitListener>>>,
) {
    let summary = {
        let mut record = record.lock();
        if record.status == SessionStatus::Exited {
            return;
        }
        record.status = SessionStatus::Exited;
        record.exit_code = Some(exit_code);
        let finished = clock.now_ms();
        record.finished_at = Some(finished);
        SessionExitSummary {
            session_id: record.id.clone(),
            command: record.command.clone(),
            cwd: record.cwd.clone(),
            timed_out: record.timed_out,
            exit_code: record.exit_code,
            started_at: record.started_at,
            finished_at: finished,
            duration_ms: finished.saturating_sub(record.started_at),
        }
    };

    events.lock().append(summary.clone());

    let snapshot: Vec<ExitListener> = listeners.lock().values().cloned().collect();
    for listener in snapshot {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener(&summary)));
        if result.is_err() {
            tracing::warn!(session = %summary.session_id, "session exit listener panicked");
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
