// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shell selection for exec and sessions.
//!
//! The contract is "execute the literal command string through a user
//! shell": `$SHELL -lc <cmd>` with a `/bin/bash` fallback on POSIX,
//! `cmd.exe /d /s /c <cmd>` on Windows.

/// Program and arguments to run `command` through the user's shell.
#[cfg(unix)]
pub fn shell_invocation(command: &str) -> (String, Vec<String>) {
    let shell = std::env::var("SHELL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "/bin/bash".to_string());
    (
        shell,
        vec!["-lc".to_string(), command.to_string()],
    )
}

#[cfg(windows)]
pub fn shell_invocation(command: &str) -> (String, Vec<String>) {
    (
        "cmd.exe".to_string(),
        vec![
            "/d".to_string(),
            "/s".to_string(),
            "/c".to_string(),
            command.to_string(),
        ],
    )
}

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
