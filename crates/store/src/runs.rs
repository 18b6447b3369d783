// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable run records.
//!
//! A run summarizes an exec, session, or cron firing for later inspection
//! by clients; it is orthogonal to the live session object. The store is
//! bounded to the most recent [`MAX_RUNS`] records, FIFO-trimmed by
//! insertion order, and keeps a `.bak` copy for crash recovery.

use std::path::PathBuf;
use std::sync::Arc;

use companion_core::{new_hex_id, trim_to, Clock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::persist::{load_json_with_backup, write_json_atomic, StoreError};

/// Maximum retained run records.
pub const MAX_RUNS: usize = 200;

/// Maximum characters kept for summary and error strings.
pub const MAX_TEXT: usize = 500;

/// Run kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    Exec,
    Session,
    Cron,
    Heartbeat,
}

impl RunType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exec" => Some(Self::Exec),
            "session" => Some(Self::Session),
            "cron" => Some(Self::Cron),
            "heartbeat" => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

/// Run lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Running,
    WaitingApproval,
    Retrying,
    Done,
    Failed,
}

impl RunState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "waiting_approval" => Some(Self::WaitingApproval),
            "retrying" => Some(Self::Retrying),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    fn implies_started(&self) -> bool {
        matches!(self, Self::Running | Self::Retrying)
    }
}

/// Delivery bookkeeping for runs routed to an external channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryState {
    pub channel: String,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<u64>,
}

/// A durable run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEnvelope {
    pub run_id: String,
    #[serde(rename = "type")]
    pub kind: RunType,
    pub state: RunState,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub meta: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_state: Option<DeliveryState>,
}

impl RunEnvelope {
    /// Sort key: most recent activity first (`finishedAt` → `updatedAt` →
    /// `createdAt`).
    fn recency(&self) -> (u64, u64, u64) {
        (
            self.finished_at.unwrap_or(self.updated_at),
            self.updated_at,
            self.created_at,
        )
    }

    fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.finished_at) {
            (Some(s), Some(f)) if f >= s => Some(f - s),
            _ => None,
        }
    }
}

/// Parameters for creating a run.
#[derive(Debug, Clone, Default)]
pub struct CreateRun {
    pub run_id: Option<String>,
    pub kind: Option<RunType>,
    pub state: Option<RunState>,
    pub summary: Option<String>,
    pub error: Option<String>,
    pub meta: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Parameters for updating a run. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateRun {
    pub state: Option<RunState>,
    pub summary: Option<String>,
    pub error: Option<String>,
    pub meta: Option<serde_json::Map<String, serde_json::Value>>,
    pub delivery_state: Option<DeliveryState>,
}

/// List filter and paging.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub kind: Option<RunType>,
    pub state: Option<RunState>,
    pub offset: usize,
    pub limit: Option<usize>,
}

/// One page of runs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPage {
    pub runs: Vec<RunEnvelope>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

/// Aggregate view over recent runs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDiagnostics {
    pub sampled: usize,
    pub completion_rate: Option<f64>,
    pub avg_duration_ms: Option<u64>,
    pub p95_duration_ms: Option<u64>,
    pub by_type: serde_json::Map<String, serde_json::Value>,
    pub last_hour: usize,
    pub last_6_hours: usize,
    pub last_24_hours: usize,
    pub recent: Vec<RunEnvelope>,
    pub history: Vec<RunHistoryEntry>,
}

/// Compact summary of an older run for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunHistoryEntry {
    pub run_id: String,
    #[serde(rename = "type")]
    pub kind: RunType,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RunsFile {
    #[serde(default)]
    runs: Vec<RunEnvelope>,
}

struct Inner {
    runs: Vec<RunEnvelope>,
    dirty: bool,
}

/// Bounded, crash-safe run store.
pub struct RunStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl RunStore {
    /// Load the store, falling back to the `.bak` copy on corruption and
    /// starting empty when both fail.
    pub fn load(path: PathBuf, clock: Arc<dyn Clock>) -> Self {
        let runs = load_json_with_backup::<RunsFile>(&path)
            .map(|f| f.runs)
            .unwrap_or_default();
        Self {
            path,
            clock,
            inner: Mutex::new(Inner { runs, dirty: false }),
        }
    }

    /// Create a run record, filling missing id/state/timestamps.
    pub fn create(&self, params: CreateRun) -> RunEnvelope {
        let now = self.clock.now_ms();
        let state = params.state.unwrap_or(RunState::Queued);
        let mut run = RunEnvelope {
            run_id: params.run_id.filter(|s| !s.is_empty()).unwrap_or_else(new_hex_id),
            kind: params.kind.unwrap_or(RunType::Exec),
            state,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            summary: params.summary.map(|s| trim_to(&s, MAX_TEXT)),
            error: params.error.map(|s| trim_to(&s, MAX_TEXT)),
            meta: params.meta.unwrap_or_default(),
            delivery_state: None,
        };
        apply_state_timestamps(&mut run, now);

        let mut inner = self.inner.lock();
        inner.runs.push(run.clone());
        if inner.runs.len() > MAX_RUNS {
            let excess = inner.runs.len() - MAX_RUNS;
            inner.runs.drain(..excess);
        }
        inner.dirty = true;
        run
    }

    /// Update a run. Terminal states auto-fill `finishedAt`; active states
    /// auto-fill `startedAt`. Returns the updated record, or `None` for an
    /// unknown id.
    pub fn update(&self, run_id: &str, update: UpdateRun) -> Option<RunEnvelope> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        let run = inner.runs.iter_mut().find(|r| r.run_id == run_id)?;

        if let Some(state) = update.state {
            run.state = state;
        }
        if let Some(summary) = update.summary {
            run.summary = Some(trim_to(&summary, MAX_TEXT));
        }
        if let Some(error) = update.error {
            run.error = Some(trim_to(&error, MAX_TEXT));
        }
        if let Some(meta) = update.meta {
            for (k, v) in meta {
                run.meta.insert(k, v);
            }
        }
        if let Some(delivery) = update.delivery_state {
            run.delivery_state = Some(delivery);
        }
        run.updated_at = now;
        apply_state_timestamps(run, now);

        let updated = run.clone();
        inner.dirty = true;
        Some(updated)
    }

    pub fn get(&self, run_id: &str) -> Option<RunEnvelope> {
        self.inner
            .lock()
            .runs
            .iter()
            .find(|r| r.run_id == run_id)
            .cloned()
    }

    /// List runs, most recent first, with paging.
    pub fn list(&self, filter: &RunFilter) -> RunPage {
        let limit = filter.limit.unwrap_or(50).clamp(1, 500);
        let mut runs: Vec<RunEnvelope> = self
            .inner
            .lock()
            .runs
            .iter()
            .filter(|r| filter.kind.is_none_or(|k| r.kind == k))
            .filter(|r| filter.state.is_none_or(|s| r.state == s))
            .cloned()
            .collect();
        runs.sort_by_key(|r| std::cmp::Reverse(r.recency()));

        let total = runs.len();
        let page: Vec<RunEnvelope> = runs.into_iter().skip(filter.offset).take(limit).collect();
        let has_more = filter.offset + page.len() < total;
        RunPage {
            runs: page,
            total,
            offset: filter.offset,
            limit,
            has_more,
        }
    }

    /// Aggregate diagnostics over the most recent `limit` runs
    /// (default 100, max 500).
    pub fn diagnostics(&self, limit: Option<usize>) -> RunDiagnostics {
        let now = self.clock.now_ms();
        let sample_size = limit.unwrap_or(100).clamp(1, 500);

        let mut runs: Vec<RunEnvelope> = self.inner.lock().runs.clone();
        runs.sort_by_key(|r| std::cmp::Reverse(r.recency()));
        runs.truncate(sample_size);

        let done = runs.iter().filter(|r| r.state == RunState::Done).count();
        let failed = runs.iter().filter(|r| r.state == RunState::Failed).count();
        let completion_rate = if done + failed > 0 {
            Some(done as f64 / (done + failed) as f64)
        } else {
            None
        };

        let mut durations: Vec<u64> = runs
            .iter()
            .filter(|r| r.state == RunState::Done)
            .filter_map(RunEnvelope::duration_ms)
            .collect();
        durations.sort_unstable();
        let avg_duration_ms = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<u64>() / durations.len() as u64)
        };
        let p95_duration_ms = percentile(&durations, 95);

        let mut by_type = serde_json::Map::new();
        for kind in ["exec", "session", "cron", "heartbeat"] {
            let count = runs
                .iter()
                .filter(|r| serde_json::to_value(r.kind).ok() == Some(kind.into()))
                .count();
            if count > 0 {
                by_type.insert(kind.to_string(), count.into());
            }
        }

        let window = |ms: u64| {
            runs.iter()
                .filter(|r| now.saturating_sub(r.created_at) <= ms)
                .count()
        };

        let recent: Vec<RunEnvelope> = runs.iter().take(10).cloned().collect();
        let history: Vec<RunHistoryEntry> = runs
            .iter()
            .skip(10)
            .map(|r| RunHistoryEntry {
                run_id: r.run_id.clone(),
                kind: r.kind,
                state: r.state,
                duration_ms: r.duration_ms(),
            })
            .collect();

        RunDiagnostics {
            sampled: runs.len(),
            completion_rate,
            avg_duration_ms,
            p95_duration_ms,
            by_type,
            last_hour: window(3_600_000),
            last_6_hours: window(6 * 3_600_000),
            last_24_hours: window(24 * 3_600_000),
            recent,
            history,
        }
    }

    pub fn needs_flush(&self) -> bool {
        self.inner.lock().dirty
    }

    /// Force pending writes to disk. The previous file is copied to `.bak`
    /// before the rename.
    pub fn flush(&self) -> Result<(), StoreError> {
        let snapshot = {
            let mut inner = self.inner.lock();
            if !inner.dirty {
                return Ok(());
            }
            inner.dirty = false;
            RunsFile {
                runs: inner.runs.clone(),
            }
        };
        write_json_atomic(&self.path, &snapshot, true)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().runs.len()
    }
}

/// Fill `startedAt`/`finishedAt` implied by the current state.
fn apply_state_timestamps(run: &mut RunEnvelope, now: u64) {
    if run.state.implies_started() && run.started_at.is_none() {
        run.started_at = Some(now);
    }
    if run.state.is_terminal() && run.finished_at.is_none() {
        run.finished_at = Some(now);
    }
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[u64], pct: usize) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted.get(rank - 1).copied()
}

#[cfg(test)]
#[path = "runs_tests.rs"]
mod tests;
