// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool-server supervision over HTTP against a scripted stdio server.

use crate::prelude::*;
use serde_json::json;

/// Shell script implementing enough MCP to handshake and answer one tool.
fn fake_server_script() -> String {
    r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"capabilities":{"tools":{}},"serverInfo":{"name":"fake"}}}\n' "$id";;
    *'"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"echo","inputSchema":{"type":"object"}}]}}\n' "$id";;
    *'"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"hi"}],"isError":false}}\n' "$id";;
  esac
done
"#
    .to_string()
}

async fn daemon_with_fake_server() -> TestDaemon {
    TestDaemon::start_with_config(json!({
        "port": 0,
        "token": TOKEN,
        "mcpServers": {
            "s": {"command": "sh", "args": ["-c", fake_server_script()]}
        }
    }))
    .await
}

#[cfg(unix)]
#[tokio::test]
async fn servers_connect_and_list_tools() {
    let daemon = daemon_with_fake_server().await;

    let servers: serde_json::Value = daemon.get("/api/mcp/servers").await.json().await.unwrap();
    let entry = &servers["servers"][0];
    assert_eq!(entry["name"], "s");
    assert_eq!(entry["status"], "connected");
    assert_eq!(entry["toolCount"], 1);

    let tools: serde_json::Value = daemon.get("/api/mcp/tools").await.json().await.unwrap();
    assert_eq!(tools["tools"][0]["server"], "s");
    assert_eq!(tools["tools"][0]["name"], "echo");

    let health: serde_json::Value = daemon.get("/healthz").await.json().await.unwrap();
    assert_eq!(health["mcpServers"], 1);
    assert_eq!(health["mcpTools"], 1);

    daemon.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn tool_call_round_trip() {
    let daemon = daemon_with_fake_server().await;

    let outcome: serde_json::Value = daemon
        .post(
            "/api/mcp/tools/call",
            json!({"server": "s", "tool": "echo", "arguments": {}}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["ok"], true);
    assert_eq!(outcome["isError"], false);
    assert_eq!(outcome["content"][0]["text"], "hi");

    daemon.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn unknown_server_or_tool_fail_soft() {
    let daemon = daemon_with_fake_server().await;

    let outcome: serde_json::Value = daemon
        .post(
            "/api/mcp/tools/call",
            json!({"server": "ghost", "tool": "echo", "arguments": {}}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["ok"], false);
    assert!(outcome["error"].as_str().unwrap().contains("unknown"));

    let outcome: serde_json::Value = daemon
        .post(
            "/api/mcp/tools/call",
            json!({"server": "s", "tool": "ghost", "arguments": {}}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["ok"], false);

    daemon.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn restart_reconnects_server() {
    let daemon = daemon_with_fake_server().await;

    let response = daemon.post("/api/mcp/servers/s/restart", json!({})).await;
    assert_eq!(response.status(), 200);

    let servers: serde_json::Value = daemon.get("/api/mcp/servers").await.json().await.unwrap();
    assert_eq!(servers["servers"][0]["status"], "connected");

    let response = daemon.post("/api/mcp/servers/ghost/restart", json!({})).await;
    assert_eq!(response.status(), 404);

    daemon.stop().await;
}
