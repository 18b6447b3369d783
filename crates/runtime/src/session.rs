// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session record types and snapshots.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::ring::{RingBuffer, RingSlice};

/// Session lifecycle status. Transitions `running → exited` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Exited,
}

impl SessionStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "exited" => Some(Self::Exited),
            _ => None,
        }
    }
}

/// Which output stream a log request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
    Both,
}

impl LogStream {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stdout" => Some(Self::Stdout),
            "stderr" => Some(Self::Stderr),
            "both" => Some(Self::Both),
            _ => None,
        }
    }
}

/// Paged log data for one or both streams.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LogSlice {
    Single(RingSlice),
    Both {
        stdout: RingSlice,
        stderr: RingSlice,
    },
}

/// Light session snapshot for listings and lookups.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub command: String,
    pub cwd: PathBuf,
    pub status: SessionStatus,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub started_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,
    pub stdout_len: usize,
    pub stderr_len: usize,
}

/// One page of session summaries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPage {
    pub sessions: Vec<SessionSummary>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

/// Internal live record. Owned by the manager; snapshots are handed out.
/// The rings are shared with the pump tasks feeding them.
pub(crate) struct SessionRecord {
    pub id: String,
    pub command: String,
    pub cwd: PathBuf,
    pub timeout_ms: u64,
    pub status: SessionStatus,
    pub stdout: Arc<Mutex<RingBuffer>>,
    pub stderr: Arc<Mutex<RingBuffer>>,
    pub timed_out: bool,
    pub exit_code: Option<i32>,
    pub started_at: u64,
    pub finished_at: Option<u64>,
    pub pid: Option<i32>,
}

impl SessionRecord {
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            command: self.command.clone(),
            cwd: self.cwd.clone(),
            status: self.status,
            timed_out: self.timed_out,
            exit_code: self.exit_code,
            started_at: self.started_at,
            finished_at: self.finished_at,
            stdout_len: self.stdout.lock().char_len(),
            stderr_len: self.stderr.lock().char_len(),
        }
    }

    /// Sort key for listings: `finishedAt` if set, else `startedAt`.
    pub fn recency(&self) -> u64 {
        self.finished_at.unwrap_or(self.started_at)
    }
}
