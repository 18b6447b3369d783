// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! companion-store: crash-safe single-file JSON stores.
//!
//! All stores share one discipline: pretty-printed JSON with a trailing
//! newline, written atomically via `.tmp` + rename with owner-only file
//! modes. Mutations mark the store dirty; the daemon's flush task folds
//! bursts of updates into one on-disk write, and `flush()` forces a
//! synchronous write at shutdown.

pub mod approvals;
pub mod config;
pub mod cron;
pub mod persist;
pub mod runs;

pub use approvals::{ApprovalRecord, ApprovalStatus, ApprovalStore, CreateApproval, Resolution};
pub use config::{ConfigFile, ConfigStore, McpServerDecl};
pub use cron::{CronJob, CronSchedule, CronStore, PendingFiring};
pub use persist::StoreError;
pub use runs::{
    CreateRun, DeliveryState, RunDiagnostics, RunEnvelope, RunFilter, RunPage, RunState, RunStore,
    RunType, UpdateRun,
};
