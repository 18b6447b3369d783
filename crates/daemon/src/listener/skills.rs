// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Skill bundle extraction.
//!
//! Writes a bundle of text files under a per-skill directory. Paths are
//! strictly validated: relative only, no parent traversal, no
//! backslashes, no control characters, bounded depth and size. The
//! bundle replaces the previous skill directory atomically.

use std::path::{Component, Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use super::error::ApiError;
use super::ListenCtx;

/// Bundle limits.
pub const MAX_FILES: usize = 50;
pub const MAX_FILE_BYTES: usize = 100_000;
pub const MAX_DEPTH: usize = 4;

#[derive(Debug, Deserialize)]
pub struct SkillFile {
    pub path: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractBody {
    pub name: Option<String>,
    #[serde(default)]
    pub files: Vec<SkillFile>,
}

/// Validate a skill name: a single safe path component.
fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() || name.len() > 128 {
        return Err(ApiError::Validation("invalid skill name".to_string()));
    }
    if name == "." || name == ".." {
        return Err(ApiError::Validation("invalid skill name".to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(ApiError::Validation(
            "skill name may only contain alphanumerics, dash, underscore, dot".to_string(),
        ));
    }
    Ok(())
}

/// Validate one relative bundle path.
fn validate_rel_path(raw: &str) -> Result<PathBuf, ApiError> {
    if raw.is_empty() {
        return Err(ApiError::Validation("file path is required".to_string()));
    }
    if raw.contains('\\') {
        return Err(ApiError::Validation(format!(
            "backslashes are not allowed in {}",
            raw
        )));
    }
    if raw.chars().any(|c| c.is_control()) {
        return Err(ApiError::Validation(
            "control characters are not allowed in file paths".to_string(),
        ));
    }

    let path = FsPath::new(raw);
    if path.is_absolute() {
        return Err(ApiError::Validation(format!(
            "absolute paths are not allowed: {}",
            raw
        )));
    }

    let mut depth = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            _ => {
                return Err(ApiError::Validation(format!(
                    "parent traversal is not allowed: {}",
                    raw
                )));
            }
        }
    }
    if depth == 0 || depth > MAX_DEPTH {
        return Err(ApiError::Validation(format!(
            "path depth must be between 1 and {}: {}",
            MAX_DEPTH, raw
        )));
    }

    Ok(path.to_path_buf())
}

pub async fn handle_extract(
    State(ctx): State<Arc<ListenCtx>>,
    Json(body): Json<ExtractBody>,
) -> Result<Json<Value>, ApiError> {
    let name = body
        .name
        .ok_or_else(|| ApiError::Validation("name is required".to_string()))?;
    validate_name(&name)?;

    if body.files.is_empty() {
        return Err(ApiError::Validation("files is required".to_string()));
    }
    if body.files.len() > MAX_FILES {
        return Err(ApiError::Validation(format!(
            "too many files (max {})",
            MAX_FILES
        )));
    }

    let mut entries = Vec::with_capacity(body.files.len());
    for file in body.files {
        let raw = file
            .path
            .ok_or_else(|| ApiError::Validation("file path is required".to_string()))?;
        let content = file
            .content
            .ok_or_else(|| ApiError::Validation(format!("content is required for {}", raw)))?;
        if content.len() > MAX_FILE_BYTES {
            return Err(ApiError::Validation(format!(
                "file {} exceeds {} bytes",
                raw, MAX_FILE_BYTES
            )));
        }
        entries.push((validate_rel_path(&raw)?, content));
    }

    write_bundle(&ctx.skills_dir, &name, &entries)
        .map_err(|e| ApiError::Validation(format!("failed to write skill bundle: {}", e)))?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "name": name,
        "filesWritten": entries.len(),
    })))
}

/// Write the bundle to a staging directory, then swap it into place.
fn write_bundle(
    skills_dir: &FsPath,
    name: &str,
    entries: &[(PathBuf, String)],
) -> std::io::Result<()> {
    companion_store::persist::ensure_private_dir(skills_dir)
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let staging = skills_dir.join(format!(".{}.tmp", name));
    let target = skills_dir.join(name);
    if staging.exists() {
        std::fs::remove_dir_all(&staging)?;
    }

    for (rel, content) in entries {
        let dest = staging.join(rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dest, content)?;
        companion_store::persist::set_mode(&dest, 0o600);
    }

    if target.exists() {
        std::fs::remove_dir_all(&target)?;
    }
    std::fs::rename(&staging, &target)?;
    Ok(())
}

pub async fn handle_delete(
    State(ctx): State<Arc<ListenCtx>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    validate_name(&name)?;
    let target = ctx.skills_dir.join(&name);
    if !target.exists() {
        return Err(ApiError::NotFound(format!("unknown skill: {}", name)));
    }
    std::fs::remove_dir_all(&target)
        .map_err(|e| ApiError::Internal(format!("failed to delete skill: {}", e)))?;
    Ok(Json(serde_json::json!({"ok": true, "name": name})))
}

#[cfg(test)]
#[path = "skills_tests.rs"]
mod tests;
