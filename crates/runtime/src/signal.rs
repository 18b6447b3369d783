// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal delivery to session children.

/// Signals the runtime can deliver to a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChildSignal {
    Terminate,
    Kill,
    Interrupt,
    Suspend,
}

#[cfg(unix)]
pub(crate) fn signal_child(pid: Option<i32>, sig: ChildSignal) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    let sig = match sig {
        ChildSignal::Terminate => Signal::SIGTERM,
        ChildSignal::Kill => Signal::SIGKILL,
        ChildSignal::Interrupt => Signal::SIGINT,
        ChildSignal::Suspend => Signal::SIGTSTP,
    };
    if let Err(e) = signal::kill(Pid::from_raw(pid), sig) {
        tracing::debug!(pid, signal = ?sig, error = %e, "failed to signal child");
    }
}

#[cfg(not(unix))]
pub(crate) fn signal_child(_pid: Option<i32>, _sig: ChildSignal) {}
