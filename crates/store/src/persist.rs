// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic JSON persistence shared by all stores.
//!
//! Write path: serialize pretty + trailing newline into `<target>.tmp`
//! (owner-only mode), optionally copy the previous `<target>` to
//! `<target>.bak`, then rename over `<target>`. A crash can leave an
//! orphaned `.tmp` behind; loads unlink it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur in store persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Sibling path with a suffix appended to the full file name
/// (`runs.json` → `runs.json.tmp`).
pub fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}", name, suffix))
}

/// Create `dir` (and parents) with owner-only permissions.
pub fn ensure_private_dir(dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dir)?;
    set_mode(dir, 0o700);
    Ok(())
}

/// Best-effort owner-only file/directory mode.
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        warn!(path = %path.display(), error = %e, "failed to set file mode");
    }
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) {}

/// Write `value` atomically to `path`.
///
/// When `backup` is set the previous `path` is copied to `path.bak` before
/// the rename, so a corrupt write can be recovered from.
pub fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
    backup: bool,
) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        ensure_private_dir(parent)?;
    }

    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');

    let tmp = sibling(path, ".tmp");
    fs::write(&tmp, &bytes)?;
    set_mode(&tmp, 0o600);

    if backup && path.exists() {
        if let Err(e) = fs::copy(path, sibling(path, ".bak")) {
            warn!(path = %path.display(), error = %e, "failed to write backup copy");
        } else {
            set_mode(&sibling(path, ".bak"), 0o600);
        }
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load JSON from `path`, returning `None` when the file is missing or
/// unparseable. An orphaned `.tmp` from a prior crash is unlinked.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let tmp = sibling(path, ".tmp");
    if tmp.exists() {
        let _ = fs::remove_file(&tmp);
    }

    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to parse store file");
            None
        }
    }
}

/// Load JSON from `path`, falling back to `path.bak` on a parse failure.
pub fn load_json_with_backup<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if let Some(value) = load_json(path) {
        return Some(value);
    }
    let bak = sibling(path, ".bak");
    if bak.exists() {
        warn!(path = %path.display(), "recovering store from backup");
        return load_json(&bak);
    }
    None
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
