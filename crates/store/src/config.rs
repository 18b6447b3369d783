// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration file.
//!
//! `companion.json` is the authoritative source for the listen port, the
//! bearer token, the declared tool servers, and the permission policy.
//! A daemon started from a token-less config generates a token and
//! persists it back immediately.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use companion_policy::PolicyInput;
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::persist::{ensure_private_dir, load_json, write_json_atomic, StoreError};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 41591;

/// Declared tool server: how to spawn the child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerDecl {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

/// On-disk configuration shape.
///
/// `mcpServers` is kept as raw JSON so unknown fields in declared entries
/// survive a save/load round trip; typed declarations are extracted
/// best-effort via [`ConfigFile::tool_servers`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub permission_policy: PolicyInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_ids: Option<Vec<String>>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            token: None,
            mcp_servers: BTreeMap::new(),
            permission_policy: PolicyInput::default(),
            extension_ids: None,
        }
    }
}

impl ConfigFile {
    /// Typed tool-server declarations. Entries without a usable `command`
    /// are skipped with a warning.
    pub fn tool_servers(&self) -> Vec<(String, McpServerDecl)> {
        let mut out = Vec::new();
        for (name, raw) in &self.mcp_servers {
            match serde_json::from_value::<McpServerDecl>(raw.clone()) {
                Ok(decl) if !decl.command.trim().is_empty() => out.push((name.clone(), decl)),
                Ok(_) => warn!(server = %name, "skipping tool server with empty command"),
                Err(e) => warn!(server = %name, error = %e, "skipping invalid tool server entry"),
            }
        }
        out
    }
}

/// Generate a 24-byte random token in hex.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

struct Inner {
    file: ConfigFile,
    dirty: bool,
}

/// Config store with the shared flush discipline.
pub struct ConfigStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl ConfigStore {
    /// Load `companion.json` from `dir`, creating the directory with
    /// owner-only mode. A missing token is generated and persisted
    /// immediately.
    pub fn init(dir: &Path) -> Result<Self, StoreError> {
        ensure_private_dir(dir)?;
        let path = dir.join("companion.json");
        let mut file = load_json::<ConfigFile>(&path).unwrap_or_default();

        let fresh_token = file.token.is_none();
        if fresh_token {
            file.token = Some(generate_token());
        }

        let store = Self {
            path,
            inner: Mutex::new(Inner { file, dirty: false }),
        };
        if fresh_token {
            store.inner.lock().dirty = true;
            store.flush()?;
        }
        Ok(store)
    }

    pub fn port(&self) -> u16 {
        self.inner.lock().file.port
    }

    /// The authoritative bearer token.
    pub fn token(&self) -> String {
        let mut inner = self.inner.lock();
        match &inner.file.token {
            Some(token) => token.clone(),
            None => {
                let token = generate_token();
                inner.file.token = Some(token.clone());
                inner.dirty = true;
                token
            }
        }
    }

    pub fn policy_input(&self) -> PolicyInput {
        self.inner.lock().file.permission_policy.clone()
    }

    pub fn set_policy_input(&self, input: PolicyInput) {
        let mut inner = self.inner.lock();
        inner.file.permission_policy = input;
        inner.dirty = true;
    }

    pub fn tool_servers(&self) -> Vec<(String, McpServerDecl)> {
        self.inner.lock().file.tool_servers()
    }

    pub fn snapshot(&self) -> ConfigFile {
        self.inner.lock().file.clone()
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
            inner.file.clone()
        };
        write_json_atomic(&self.path, &snapshot, false)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
