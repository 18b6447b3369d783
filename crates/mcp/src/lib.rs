// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! companion-mcp: tool-server transport and supervision.
//!
//! Tool servers are child processes speaking newline-delimited JSON-RPC
//! 2.0 over stdio. The [`StdioTransport`] owns one child and correlates
//! requests to responses; the [`Supervisor`] owns the set of configured
//! servers and their lifecycle.

pub mod supervisor;
pub mod transport;

pub use supervisor::{
    CallOutcome, ServerInfo, ServerSpec, ServerStatus, Supervisor, SupervisorError, ToolDescriptor,
};
pub use transport::{StdioTransport, TransportError};
