// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! companion-policy: workspace sandboxing for command execution.
//!
//! A [`PermissionPolicy`] is either `full` (no gating) or `workspace`
//! (commands and working directories are admitted only when every
//! path they reference stays inside a configured root set).

mod command;
mod path;

pub use command::enforce_command_policy;
pub use path::{expand_tilde, normalize_path, path_within};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from policy normalization and enforcement.
///
/// `Violation` is the single kind the HTTP layer maps to 403; everything
/// else about bad input is `Invalid` (400).
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("permission policy violation: {0}")]
    Violation(String),

    #[error("{0}")]
    Invalid(String),
}

/// Policy mode tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    Full,
    Workspace,
}

/// Normalized permission policy.
///
/// Invariant: in `full` mode the root set is empty; in `workspace` mode
/// roots are absolute, `~`-expanded, and deduplicated in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionPolicy {
    pub mode: PolicyMode,
    #[serde(default)]
    pub roots: Vec<PathBuf>,
}

impl PermissionPolicy {
    /// Unrestricted policy.
    pub fn full() -> Self {
        Self {
            mode: PolicyMode::Full,
            roots: Vec::new(),
        }
    }

    /// Workspace policy with the given roots (normalized).
    pub fn workspace(roots: Vec<PathBuf>) -> Self {
        let mut out = Vec::new();
        for root in roots {
            if !out.contains(&root) {
                out.push(root);
            }
        }
        Self {
            mode: PolicyMode::Workspace,
            roots: out,
        }
    }

    pub fn is_full(&self) -> bool {
        self.mode == PolicyMode::Full
    }
}

impl Default for PermissionPolicy {
    /// The safe default: workspace mode with no roots (nothing admissible
    /// until roots are configured).
    fn default() -> Self {
        Self {
            mode: PolicyMode::Workspace,
            roots: Vec::new(),
        }
    }
}

/// Raw policy fragment as it appears in config or on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyInput {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub roots: Option<Vec<String>>,
}

/// Normalize a raw policy fragment.
///
/// Unknown modes normalize to `workspace` (the more restrictive choice)
/// unless `strict` is set, in which case they fail. Roots are `~`-expanded
/// and deduplicated; relative roots fail in strict mode and are skipped
/// otherwise.
pub fn normalize(input: &PolicyInput, strict: bool) -> Result<PermissionPolicy, PolicyError> {
    let mode = match input.mode.as_deref().map(str::trim) {
        Some("full") => PolicyMode::Full,
        Some("workspace") | None => PolicyMode::Workspace,
        Some(other) if strict => {
            return Err(PolicyError::Invalid(format!(
                "unknown permission policy mode: {}",
                other
            )));
        }
        Some(other) => {
            tracing::warn!(mode = other, "unknown policy mode, treating as workspace");
            PolicyMode::Workspace
        }
    };

    if mode == PolicyMode::Full {
        return Ok(PermissionPolicy::full());
    }

    let mut roots = Vec::new();
    for raw in input.roots.iter().flatten() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let expanded = expand_tilde(trimmed);
        if !expanded.is_absolute() {
            if strict {
                return Err(PolicyError::Invalid(format!(
                    "workspace root is not absolute: {}",
                    trimmed
                )));
            }
            tracing::warn!(root = trimmed, "skipping non-absolute workspace root");
            continue;
        }
        roots.push(normalize_path(&expanded));
    }

    Ok(PermissionPolicy::workspace(roots))
}

/// Resolve the effective working directory for a command.
///
/// Picks `requested` when non-empty, else the first workspace root
/// (workspace mode), else the user's home directory (full mode). The
/// directory must exist. In workspace mode the cwd and the roots are
/// canonicalized (symlinks resolved) before the containment check, so a
/// symlink can never be a boundary escape.
pub fn resolve_cwd(
    requested: Option<&str>,
    policy: &PermissionPolicy,
) -> Result<PathBuf, PolicyError> {
    let candidate = match requested.map(str::trim).filter(|s| !s.is_empty()) {
        Some(req) => expand_tilde(req),
        None => match policy.mode {
            PolicyMode::Workspace => policy
                .roots
                .first()
                .cloned()
                .ok_or_else(|| PolicyError::Invalid("no workspace roots configured".to_string()))?,
            PolicyMode::Full => dirs::home_dir()
                .ok_or_else(|| PolicyError::Invalid("cannot determine home directory".to_string()))?,
        },
    };

    let meta = std::fs::metadata(&candidate).map_err(|e| {
        PolicyError::Invalid(format!(
            "working directory {} is not accessible: {}",
            candidate.display(),
            e
        ))
    })?;
    if !meta.is_dir() {
        return Err(PolicyError::Invalid(format!(
            "working directory {} is not a directory",
            candidate.display()
        )));
    }

    if policy.mode == PolicyMode::Full {
        return Ok(candidate);
    }

    let resolved = candidate
        .canonicalize()
        .map_err(|e| PolicyError::Invalid(format!("cannot resolve {}: {}", candidate.display(), e)))?;

    let contained = policy.roots.iter().any(|root| {
        let root = root.canonicalize().unwrap_or_else(|_| root.clone());
        path_within(&resolved, &root)
    });
    if !contained {
        return Err(PolicyError::Violation(format!(
            "working directory {} is outside the workspace",
            resolved.display()
        )));
    }

    Ok(resolved)
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
