// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve the config directory:
/// `COMPANION_CONFIG_DIR` > platform config dir `/companion` > `~/.config/companion`.
pub fn config_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("COMPANION_CONFIG_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(base) = dirs::config_dir() {
        return Ok(base.join("companion"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoConfigDir)?;
    Ok(PathBuf::from(home).join(".config/companion"))
}

/// Scheduler tick interval override
pub fn timer_check_ms() -> Option<Duration> {
    std::env::var("COMPANION_TIMER_CHECK_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}
