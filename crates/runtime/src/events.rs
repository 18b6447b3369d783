// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session exit event log.
//!
//! An append-only log of at most [`MAX_EVENTS`] entries with strictly
//! increasing cursors. The head is truncated when the bound is exceeded;
//! cursors are never reused, so clients can poll with `after=<cursor>`.

use std::collections::VecDeque;
use std::path::PathBuf;

use serde::Serialize;

/// Maximum retained events.
pub const MAX_EVENTS: usize = 500;

/// Exit summary carried by a `session_exited` event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExitSummary {
    pub session_id: String,
    pub command: String,
    pub cwd: PathBuf,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub started_at: u64,
    pub finished_at: u64,
    pub duration_ms: u64,
}

/// One event in the log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub cursor: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(flatten)]
    pub summary: SessionExitSummary,
}

/// Bounded event log with monotonic cursors.
#[derive(Debug, Default)]
pub struct SessionEventLog {
    events: VecDeque<SessionEvent>,
    next_cursor: u64,
}

impl SessionEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a `session_exited` event, returning its cursor.
    pub fn append(&mut self, summary: SessionExitSummary) -> u64 {
        self.next_cursor += 1;
        let cursor = self.next_cursor;
        self.events.push_back(SessionEvent {
            cursor,
            kind: "session_exited",
            summary,
        });
        while self.events.len() > MAX_EVENTS {
            self.events.pop_front();
        }
        cursor
    }

    /// Events with cursor strictly greater than `after`, oldest first.
    pub fn list_after(&self, after: u64, limit: usize) -> Vec<SessionEvent> {
        self.events
            .iter()
            .filter(|e| e.cursor > after)
            .take(limit)
            .cloned()
            .collect()
    }

    /// The newest assigned cursor (0 when nothing was ever appended).
    pub fn latest_cursor(&self) -> u64 {
        self.next_cursor
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
