// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Approval records: request-for-consent entries with a
//! pending → approved/rejected/expired lifecycle.

use std::path::PathBuf;
use std::sync::Arc;

use companion_core::{new_hex_id, trim_to, Clock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::persist::{load_json, write_json_atomic, StoreError};

/// Maximum retained approval records.
pub const MAX_APPROVALS: usize = 500;

/// How long resolved records are kept before pruning.
pub const RESOLVED_RETENTION_MS: u64 = 24 * 3_600_000;

/// Default time-to-expiry for new approvals.
pub const DEFAULT_EXPIRY_MS: u64 = 10 * 60_000;

/// Bounds for caller-supplied expiry.
pub const MIN_EXPIRY_MS: u64 = 10_000;
pub const MAX_EXPIRY_MS: u64 = 24 * 3_600_000;

const MAX_PREVIEW: usize = 500;

/// Approval lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

/// Terminal resolution chosen by a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Approved,
    Rejected,
}

impl Resolution {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" | "approve" => Some(Self::Approved),
            "rejected" | "reject" => Some(Self::Rejected),
            _ => None,
        }
    }

    fn status(self) -> ApprovalStatus {
        match self {
            Self::Approved => ApprovalStatus::Approved,
            Self::Rejected => ApprovalStatus::Rejected,
        }
    }
}

/// A request-for-consent record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    pub request_id: String,
    #[serde(default)]
    pub conversation_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_preview: String,
    #[serde(default)]
    pub risk_level: String,
    #[serde(default)]
    pub channels: Vec<String>,
    pub status: ApprovalStatus,
    pub created_at: u64,
    pub expires_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

/// Parameters for creating an approval.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApproval {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub tool_name: String,
    #[serde(default)]
    pub tool_preview: Option<String>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub expires_in_ms: Option<u64>,
    #[serde(default)]
    pub meta: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ApprovalsFile {
    #[serde(default)]
    approvals: Vec<ApprovalRecord>,
}

struct Inner {
    approvals: Vec<ApprovalRecord>,
    dirty: bool,
}

/// Bounded approval store.
pub struct ApprovalStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl ApprovalStore {
    pub fn load(path: PathBuf, clock: Arc<dyn Clock>) -> Self {
        let approvals = load_json::<ApprovalsFile>(&path)
            .map(|f| f.approvals)
            .unwrap_or_default();
        Self {
            path,
            clock,
            inner: Mutex::new(Inner {
                approvals,
                dirty: false,
            }),
        }
    }

    /// Create a pending approval, filling missing id and clamping expiry.
    pub fn create(&self, params: CreateApproval) -> ApprovalRecord {
        let now = self.clock.now_ms();
        let expires_in = params
            .expires_in_ms
            .unwrap_or(DEFAULT_EXPIRY_MS)
            .clamp(MIN_EXPIRY_MS, MAX_EXPIRY_MS);
        let record = ApprovalRecord {
            request_id: params
                .request_id
                .filter(|s| !s.is_empty())
                .unwrap_or_else(new_hex_id),
            conversation_id: params.conversation_id.unwrap_or_default(),
            tool_name: params.tool_name,
            tool_preview: trim_to(params.tool_preview.as_deref().unwrap_or(""), MAX_PREVIEW),
            risk_level: params.risk_level.unwrap_or_default(),
            channels: params.channels,
            status: ApprovalStatus::Pending,
            created_at: now,
            expires_at: now + expires_in,
            resolved_at: None,
            resolved_by: None,
            meta: params.meta.unwrap_or_default(),
        };

        let mut inner = self.inner.lock();
        inner.approvals.push(record.clone());
        Self::enforce_cap(&mut inner);
        inner.dirty = true;
        record
    }

    /// Resolve a pending approval. A second resolve on an already-resolved
    /// record is an idempotent no-op returning the current state.
    pub fn resolve(
        &self,
        request_id: &str,
        resolution: Resolution,
        resolved_by: Option<String>,
    ) -> Option<ApprovalRecord> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        Self::expire_locked(&mut inner, now);

        let record = inner
            .approvals
            .iter_mut()
            .find(|a| a.request_id == request_id)?;
        if record.status != ApprovalStatus::Pending {
            return Some(record.clone());
        }

        record.status = resolution.status();
        record.resolved_at = Some(now);
        record.resolved_by = resolved_by;
        let resolved = record.clone();
        inner.dirty = true;
        Some(resolved)
    }

    pub fn get(&self, request_id: &str) -> Option<ApprovalRecord> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        Self::expire_locked(&mut inner, now);
        inner
            .approvals
            .iter()
            .find(|a| a.request_id == request_id)
            .cloned()
    }

    /// Pending approvals, oldest first. Overdue records are flipped to
    /// expired before the scan.
    pub fn list_pending(&self) -> Vec<ApprovalRecord> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        Self::expire_locked(&mut inner, now);
        inner
            .approvals
            .iter()
            .filter(|a| a.status == ApprovalStatus::Pending)
            .cloned()
            .collect()
    }

    /// Flip `pending → expired` where `expiresAt <= now`, then prune
    /// resolved records past the retention window.
    pub fn expire_overdue(&self) -> usize {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        Self::expire_locked(&mut inner, now)
    }

    fn expire_locked(inner: &mut Inner, now: u64) -> usize {
        let mut expired = 0;
        for record in &mut inner.approvals {
            if record.status == ApprovalStatus::Pending && record.expires_at <= now {
                record.status = ApprovalStatus::Expired;
                record.resolved_at = Some(now);
                expired += 1;
            }
        }

        let before = inner.approvals.len();
        inner.approvals.retain(|a| {
            a.status == ApprovalStatus::Pending
                || a.resolved_at
                    .is_none_or(|at| now.saturating_sub(at) < RESOLVED_RETENTION_MS)
        });
        if expired > 0 || inner.approvals.len() != before {
            inner.dirty = true;
        }
        expired
    }

    fn enforce_cap(inner: &mut Inner) {
        if inner.approvals.len() > MAX_APPROVALS {
            let excess = inner.approvals.len() - MAX_APPROVALS;
            inner.approvals.drain(..excess);
        }
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
            ApprovalsFile {
                approvals: inner.approvals.clone(),
            }
        };
        write_json_atomic(&self.path, &snapshot, false)
    }
}

#[cfg(test)]
#[path = "approvals_tests.rs"]
mod tests;
