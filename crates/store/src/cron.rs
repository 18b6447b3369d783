// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron job mirror and pending firings.
//!
//! Jobs are authored by the extension; the Companion stores a mirror plus
//! the list of firings that happened without an online consumer. At most
//! one pending entry exists per task id: a new firing supersedes older
//! ones (compaction, newest wins).

use std::path::PathBuf;
use std::sync::Arc;

use companion_core::Clock;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::persist::{load_json, write_json_atomic, StoreError};

/// Schedule of a recurring job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CronSchedule {
    /// Every `minutes` minutes (clamped to at least one).
    Interval { minutes: u64 },
    /// Daily at `hour:minute` in the IANA timezone `tz`.
    Daily { hour: u8, minute: u8, tz: String },
}

/// Mirror of an extension-authored recurring job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub schedule: CronSchedule,
}

fn default_enabled() -> bool {
    true
}

/// A firing that happened without an online consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFiring {
    pub task_id: String,
    pub missed_at: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CronFile {
    #[serde(default)]
    jobs: Vec<CronJob>,
    #[serde(default)]
    pending: Vec<PendingFiring>,
}

struct Inner {
    jobs: Vec<CronJob>,
    pending: Vec<PendingFiring>,
    dirty: bool,
}

/// Store for cron jobs and their pending firings.
pub struct CronStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl CronStore {
    pub fn load(path: PathBuf, clock: Arc<dyn Clock>) -> Self {
        let file = load_json::<CronFile>(&path).unwrap_or_default();
        Self {
            path,
            clock,
            inner: Mutex::new(Inner {
                jobs: file.jobs,
                pending: file.pending,
                dirty: false,
            }),
        }
    }

    /// Insert or replace a job by id. Returns the stored job.
    pub fn upsert_job(&self, job: CronJob) -> CronJob {
        let mut inner = self.inner.lock();
        match inner.jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job.clone(),
            None => inner.jobs.push(job.clone()),
        }
        inner.dirty = true;
        job
    }

    /// Remove a job and its pending firings. Returns whether a job existed.
    pub fn remove_job(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.jobs.len();
        inner.jobs.retain(|j| j.id != id);
        let removed = inner.jobs.len() != before;
        if removed {
            inner.pending.retain(|p| p.task_id != id);
            inner.dirty = true;
        }
        removed
    }

    pub fn get_job(&self, id: &str) -> Option<CronJob> {
        self.inner.lock().jobs.iter().find(|j| j.id == id).cloned()
    }

    pub fn jobs(&self) -> Vec<CronJob> {
        self.inner.lock().jobs.clone()
    }

    /// Record a firing for `task_id`, compacting away any prior pending
    /// entry for the same task.
    pub fn add_pending_run(&self, task_id: &str) -> PendingFiring {
        let firing = PendingFiring {
            task_id: task_id.to_string(),
            missed_at: self.clock.now_ms(),
        };
        let mut inner = self.inner.lock();
        inner.pending.retain(|p| p.task_id != task_id);
        inner.pending.push(firing.clone());
        inner.dirty = true;
        firing
    }

    /// Remove all pending entries matching any of `ids`. Returns the
    /// number removed.
    pub fn ack_pending_runs(&self, ids: &[String]) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.pending.len();
        inner.pending.retain(|p| !ids.iter().any(|id| *id == p.task_id));
        let removed = before - inner.pending.len();
        if removed > 0 {
            inner.dirty = true;
        }
        removed
    }

    pub fn pending(&self) -> Vec<PendingFiring> {
        self.inner.lock().pending.clone()
    }

    pub fn needs_flush(&self) -> bool {
        self.inner.lock().dirty
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        let snapshot = {
            let mut inner = self.inner.lock();
            if !inner.dirty {
                return Ok(());
            }
            inner.dirty = false;
            CronFile {
                jobs: inner.jobs.clone(),
                pending: inner.pending.clone(),
            }
        };
        write_json_atomic(&self.path, &snapshot, false)
    }
}

#[cfg(test)]
#[path = "cron_tests.rs"]
mod tests;
