// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command admission for workspace mode.
//!
//! The gate is deliberately conservative: destructive keywords and shell
//! constructs that defeat static path analysis are rejected outright, then
//! every path-like token in the command must resolve inside the root set.

use std::path::{Path, PathBuf};

use crate::path::{expand_tilde, normalize_path, path_within};
use crate::{PermissionPolicy, PolicyError};

/// Keywords rejected on a case-insensitive word boundary.
const BLOCKED_WORDS: &[&str] = &["sudo", "su", "shutdown", "reboot", "halt", "poweroff"];

/// Shell constructs that can smuggle paths past tokenization.
const SUBSTITUTION_MARKERS: &[&str] = &["$(", "`", "${", "<(", ">("];

/// Check a command string against the policy.
///
/// A no-op in `full` mode. In `workspace` mode, rejects blocked keywords,
/// substitution syntax, bare `rm -rf /`, and any path-like token that
/// resolves outside the workspace roots. `cwd` anchors relative tokens.
pub fn enforce_command_policy(
    command: &str,
    cwd: &Path,
    policy: &PermissionPolicy,
) -> Result<(), PolicyError> {
    if policy.is_full() {
        return Ok(());
    }

    if let Some(word) = find_blocked_word(command) {
        return Err(PolicyError::Violation(format!(
            "blocked command keyword: {}",
            word
        )));
    }

    if has_rm_rf_root(command) {
        return Err(PolicyError::Violation(
            "refusing to remove the filesystem root".to_string(),
        ));
    }

    if let Some(marker) = SUBSTITUTION_MARKERS
        .iter()
        .copied()
        .find(|m| command.contains(m))
    {
        return Err(PolicyError::Violation(format!(
            "shell substitution is not allowed in workspace mode: {}",
            marker
        )));
    }

    for sub in split_subcommands(command) {
        for token in tokenize(&sub) {
            for candidate in path_candidates(&token) {
                if !candidate_within_roots(&candidate, cwd, &policy.roots) {
                    return Err(PolicyError::Violation(format!(
                        "path {} is outside the workspace",
                        candidate
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Find a blocked keyword at a case-insensitive word boundary.
fn find_blocked_word(command: &str) -> Option<&'static str> {
    let lower = command.to_lowercase();
    let bytes = lower.as_bytes();
    for word in BLOCKED_WORDS {
        let mut start = 0;
        while let Some(pos) = lower[start..].find(word) {
            let at = start + pos;
            let end = at + word.len();
            let before_ok = at == 0 || !is_word_byte(bytes[at - 1]);
            let after_ok = end >= bytes.len() || !is_word_byte(bytes[end]);
            if before_ok && after_ok {
                return Some(word);
            }
            start = at + 1;
        }
    }
    None
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Detect `rm -rf /` where the trailing slash does not continue into a
/// normal path character (so `rm -rf /tmp/x` falls through to path
/// analysis instead).
fn has_rm_rf_root(command: &str) -> bool {
    let lower = command.to_lowercase();
    let needle = "rm -rf /";
    let mut start = 0;
    while let Some(pos) = lower[start..].find(needle) {
        let end = start + pos + needle.len();
        match lower.as_bytes().get(end) {
            None => return true,
            Some(&b) if !is_path_byte(b) => return true,
            Some(_) => start += pos + 1,
        }
    }
    false
}

fn is_path_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-' | b'~')
}

/// Split a command line into sub-commands at `|`, `||`, `&&`, and `;`.
fn split_subcommands(command: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = command.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '|' | ';' => {
                parts.push(std::mem::take(&mut current));
            }
            '&' if chars.peek() == Some(&'&') => {
                chars.next();
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts.retain(|p| !p.trim().is_empty());
    parts
}

/// Tokenize a sub-command into quoted strings and whitespace-free runs.
///
/// Quotes are kept in the token so that one stripping layer can be applied
/// per candidate later.
fn tokenize(sub: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in sub.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => {
                if c.is_whitespace() {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                } else {
                    if c == '\'' || c == '"' {
                        quote = Some(c);
                    }
                    current.push(c);
                }
            }
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Strip one layer of matching single or double quotes.
fn strip_quotes(token: &str) -> &str {
    let bytes = token.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if first == last && (first == b'"' || first == b'\'') {
            return &token[1..token.len() - 1];
        }
    }
    token
}

/// Extract path-like candidates from a token.
///
/// Considers the token itself and, for `KEY=value` forms, the suffix after
/// the first `=`. URL-looking tokens are skipped entirely.
fn path_candidates(token: &str) -> Vec<String> {
    let mut out = Vec::new();
    let stripped = strip_quotes(token);
    if stripped.contains("://") {
        return out;
    }
    if is_path_like(stripped) {
        out.push(stripped.to_string());
    }
    if let Some(idx) = stripped.find('=') {
        let suffix = strip_quotes(&stripped[idx + 1..]);
        if !suffix.contains("://") && is_path_like(suffix) && !out.iter().any(|c| c == suffix) {
            out.push(suffix.to_string());
        }
    }
    out
}

fn is_path_like(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    if s.starts_with('.') || s.starts_with('/') || s.starts_with("~/") || s == "~" {
        return true;
    }
    if has_drive_prefix(s) {
        return true;
    }
    s.contains('/') || s.contains('\\')
}

fn has_drive_prefix(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    )
}

/// Resolve a candidate against `cwd` (or home for `~/`) and check
/// containment in the root set.
fn candidate_within_roots(candidate: &str, cwd: &Path, roots: &[PathBuf]) -> bool {
    let raw = if candidate.starts_with('~') {
        expand_tilde(candidate)
    } else {
        let p = PathBuf::from(candidate);
        if p.is_absolute() {
            p
        } else {
            cwd.join(p)
        }
    };
    let resolved = normalize_path(&raw);
    roots.iter().any(|root| path_within(&resolved, root))
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
