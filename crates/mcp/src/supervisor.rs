// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool-server supervisor.
//!
//! Owns the set of configured tool servers keyed by declared name. Start
//! performs the MCP handshake (`initialize`, `notifications/initialized`,
//! `tools/list`) and records the discovered catalog; unexpected child
//! exit flips the entry to `disconnected` and clears its tools.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use companion_core::clock::epoch_ms;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::transport::{ChildExit, StdioTransport, TransportError};

/// MCP protocol version spoken to tool servers.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Client name reported in the initialize handshake.
pub const CLIENT_NAME: &str = "companiond";

/// How to spawn a tool server child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
}

/// Lifecycle status of a supervised server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Stopped,
    Starting,
    Connected,
    Disconnected,
    Error,
}

/// A tool advertised by a connected server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

/// Snapshot of a server entry for listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub status: ServerStatus,
    pub tool_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
}

/// Outcome of a tool call. Transport errors and unknown server/tool are
/// represented here rather than raised.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallOutcome {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            content: None,
            is_error: true,
            error: Some(error.into()),
        }
    }
}

/// Supervisor errors surfaced to callers of start/stop/restart.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("unknown tool server: {0}")]
    UnknownServer(String),

    #[error("tool server {0} is already starting")]
    AlreadyStarting(String),

    #[error("failed to start tool server {name}: {reason}")]
    StartFailed { name: String, reason: String },
}

struct ServerEntry {
    spec: ServerSpec,
    status: ServerStatus,
    transport: Option<Arc<StdioTransport>>,
    tools: Vec<ToolDescriptor>,
    error: Option<String>,
    started_at: Option<u64>,
    capabilities: Option<Value>,
    starting: bool,
    // Bumped on every start/stop so a stale exit watcher cannot clobber a
    // newer incarnation of the entry.
    generation: u64,
}

impl ServerEntry {
    fn new(spec: ServerSpec) -> Self {
        Self {
            spec,
            status: ServerStatus::Stopped,
            transport: None,
            tools: Vec::new(),
            error: None,
            started_at: None,
            capabilities: None,
            starting: false,
            generation: 0,
        }
    }
}

/// Registry of supervised tool servers.
pub struct Supervisor {
    entries: Arc<Mutex<BTreeMap<String, ServerEntry>>>,
    client_version: String,
}

impl Supervisor {
    pub fn new(servers: Vec<(String, ServerSpec)>, client_version: impl Into<String>) -> Self {
        let entries = servers
            .into_iter()
            .map(|(name, spec)| (name, ServerEntry::new(spec)))
            .collect();
        Self {
            entries: Arc::new(Mutex::new(entries)),
            client_version: client_version.into(),
        }
    }

    /// Start (or restart) one server by name.
    pub async fn start_server(&self, name: &str) -> Result<(), SupervisorError> {
        let (spec, old_transport, generation) = {
            let mut entries = self.entries.lock();
            let entry = entries
                .get_mut(name)
                .ok_or_else(|| SupervisorError::UnknownServer(name.to_string()))?;
            if entry.starting {
                return Err(SupervisorError::AlreadyStarting(name.to_string()));
            }
            entry.starting = true;
            entry.status = ServerStatus::Starting;
            entry.error = None;
            entry.tools.clear();
            entry.generation += 1;
            (entry.spec.clone(), entry.transport.take(), entry.generation)
        };

        // If already running, stop first
        if let Some(old) = old_transport {
            old.close().await;
        }

        let result = self.spawn_and_handshake(name, &spec).await;
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(name) else {
            return Ok(());
        };
        entry.starting = false;

        match result {
            Ok(connected) => {
                entry.status = ServerStatus::Connected;
                entry.transport = Some(connected.transport);
                entry.tools = connected.tools;
                entry.capabilities = connected.capabilities;
                entry.started_at = Some(epoch_ms());
                entry.error = None;
                drop(entries);
                self.watch_exit(name.to_string(), generation, connected.exit_rx);
                Ok(())
            }
            Err(reason) => {
                entry.status = ServerStatus::Error;
                entry.error = Some(reason.clone());
                Err(SupervisorError::StartFailed {
                    name: name.to_string(),
                    reason,
                })
            }
        }
    }

    async fn spawn_and_handshake(
        &self,
        name: &str,
        spec: &ServerSpec,
    ) -> Result<ConnectedServer, String> {
        let (transport, exit_rx) = StdioTransport::spawn(
            &spec.command,
            &spec.args,
            &spec.env,
            spec.cwd.as_deref(),
            None,
        )
        .map_err(|e| format!("spawn failed: {}", e))?;

        let init_params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {"name": CLIENT_NAME, "version": self.client_version},
            "capabilities": {},
        });
        let init_result = match transport.request("initialize", init_params, None).await {
            Ok(result) => result,
            Err(e) => {
                transport.close().await;
                return Err(format!("initialize failed: {}", e));
            }
        };
        let capabilities = init_result.get("capabilities").cloned();

        // Best-effort: a failed initialized notification is not fatal
        if let Err(e) = transport.notify("notifications/initialized", json!({})).await {
            warn!(server = name, error = %e, "failed to send initialized notification");
        }

        let mut tools = Vec::new();
        let has_tools = capabilities
            .as_ref()
            .and_then(|c| c.get("tools"))
            .is_some_and(|t| !t.is_null());
        if has_tools {
            match transport.request("tools/list", json!({}), None).await {
                Ok(result) => tools = parse_tools(&result),
                Err(e) => {
                    warn!(server = name, error = %e, "tools/list failed, continuing without catalog");
                }
            }
        }

        info!(server = name, tools = tools.len(), "tool server connected");
        Ok(ConnectedServer {
            transport,
            tools,
            capabilities,
            exit_rx,
        })
    }

    /// Watch for unexpected child exit and downgrade the entry.
    fn watch_exit(
        &self,
        name: String,
        generation: u64,
        exit_rx: tokio::sync::oneshot::Receiver<ChildExit>,
    ) {
        let entries = Arc::clone(&self.entries);
        tokio::spawn(async move {
            let outcome = exit_rx.await.unwrap_or(ChildExit::WaitFailed);
            let mut entries = entries.lock();
            let Some(entry) = entries.get_mut(&name) else {
                return;
            };
            if entry.generation != generation {
                return;
            }
            entry.transport = None;
            entry.tools.clear();
            match outcome {
                ChildExit::Exited(code) => {
                    warn!(server = %name, code = ?code, "tool server exited unexpectedly");
                    entry.status = ServerStatus::Disconnected;
                }
                ChildExit::WaitFailed => {
                    entry.status = ServerStatus::Error;
                    entry.error = Some("failed to monitor child process".to_string());
                }
            }
        });
    }

    /// Stop one server, returning its status to `stopped`.
    pub async fn stop_server(&self, name: &str) -> Result<(), SupervisorError> {
        let transport = {
            let mut entries = self.entries.lock();
            let entry = entries
                .get_mut(name)
                .ok_or_else(|| SupervisorError::UnknownServer(name.to_string()))?;
            entry.status = ServerStatus::Stopped;
            entry.tools.clear();
            entry.error = None;
            entry.generation += 1;
            entry.transport.take()
        };
        if let Some(transport) = transport {
            transport.close().await;
        }
        Ok(())
    }

    /// Stop then start.
    pub async fn restart_server(&self, name: &str) -> Result<(), SupervisorError> {
        self.stop_server(name).await?;
        self.start_server(name).await
    }

    /// Start every configured server; one failure does not abort others.
    pub async fn start_all(&self) {
        let names: Vec<String> = self.entries.lock().keys().cloned().collect();
        let starts = names.iter().map(|name| self.start_server(name));
        for (name, result) in names.iter().zip(join_all(starts).await) {
            if let Err(e) = result {
                warn!(server = %name, error = %e, "tool server failed to start");
            }
        }
    }

    /// Invoke a tool on a connected server.
    pub async fn call_tool(&self, server: &str, tool: &str, arguments: Value) -> CallOutcome {
        let transport = {
            let entries = self.entries.lock();
            let Some(entry) = entries.get(server) else {
                return CallOutcome::failed(format!("unknown tool server: {}", server));
            };
            if entry.status != ServerStatus::Connected {
                return CallOutcome::failed(format!("tool server {} is not connected", server));
            }
            if !entry.tools.iter().any(|t| t.name == tool) {
                return CallOutcome::failed(format!("unknown tool {} on server {}", tool, server));
            }
            match &entry.transport {
                Some(t) => Arc::clone(t),
                None => return CallOutcome::failed(format!("tool server {} has no transport", server)),
            }
        };

        let params = json!({"name": tool, "arguments": arguments});
        match transport.request("tools/call", params, None).await {
            Ok(result) => {
                let is_error = result
                    .get("isError")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                CallOutcome {
                    ok: !is_error,
                    content: result.get("content").cloned(),
                    is_error,
                    error: None,
                }
            }
            Err(TransportError::Server { code, message, .. }) => {
                CallOutcome::failed(format!("tool server error {}: {}", code, message))
            }
            Err(e) => CallOutcome::failed(e.to_string()),
        }
    }

    /// Snapshot of all servers for listings.
    pub fn list_servers(&self) -> Vec<ServerInfo> {
        self.entries
            .lock()
            .iter()
            .map(|(name, entry)| ServerInfo {
                name: name.clone(),
                status: entry.status,
                tool_count: entry.tools.len(),
                error: entry.error.clone(),
                started_at: entry.started_at,
            })
            .collect()
    }

    /// All discovered tools tagged by server name.
    pub fn list_tools(&self) -> Vec<(String, ToolDescriptor)> {
        self.entries
            .lock()
            .iter()
            .flat_map(|(name, entry)| {
                entry
                    .tools
                    .iter()
                    .map(|tool| (name.clone(), tool.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn server_count(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn tool_count(&self) -> usize {
        self.entries.lock().values().map(|e| e.tools.len()).sum()
    }

    /// Close every transport. Used at daemon shutdown.
    pub async fn shutdown(&self) {
        let transports: Vec<Arc<StdioTransport>> = {
            let mut entries = self.entries.lock();
            entries
                .values_mut()
                .filter_map(|entry| {
                    entry.status = ServerStatus::Stopped;
                    entry.tools.clear();
                    entry.generation += 1;
                    entry.transport.take()
                })
                .collect()
        };
        for transport in transports {
            transport.close().await;
        }
    }
}

struct ConnectedServer {
    transport: Arc<StdioTransport>,
    tools: Vec<ToolDescriptor>,
    capabilities: Option<Value>,
    exit_rx: tokio::sync::oneshot::Receiver<ChildExit>,
}

/// Parse a `tools/list` result into descriptors.
fn parse_tools(result: &Value) -> Vec<ToolDescriptor> {
    result
        .get("tools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .filter_map(|raw| serde_json::from_value(raw.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
