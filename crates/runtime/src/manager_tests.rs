// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg(unix)]

use super::*;
use companion_core::SystemClock;
use std::sync::atomic::AtomicUsize;

fn manager() -> SessionManager {
    SessionManager::new(SessionManagerConfig::default(), Arc::new(SystemClock))
}

fn start(mgr: &SessionManager, command: &str) -> SessionSummary {
    mgr.start_session(StartSession {
        id: None,
        command: command.to_string(),
        cwd: std::env::temp_dir(),
        timeout_ms: 30_000,
        env: HashMap::new(),
    })
    .unwrap()
}

async fn wait_exited(mgr: &SessionManager, id: &str) -> SessionSummary {
    for _ in 0..200 {
        if let Some(s) = mgr.get_session(id) {
            if s.status == SessionStatus::Exited {
                return s;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("session {id} did not exit in time");
}

async fn wait_stdout_contains(mgr: &SessionManager, id: &str, needle: &str) {
    for _ in 0..200 {
        if let Ok(LogSlice::Single(slice)) = mgr.get_log(id, LogStream::Stdout, 0, 200_000) {
            if slice.output.contains(needle) {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("stdout of {id} never contained {needle:?}");
}

#[tokio::test]
async fn test_session_runs_to_completion() {
    let mgr = manager();
    let session = start(&mgr, "printf hello");
    assert_eq!(session.status, SessionStatus::Running);
    assert_eq!(session.id.len(), 32);

    let exited = wait_exited(&mgr, &session.id).await;
    assert_eq!(exited.exit_code, Some(0));
    assert!(exited.finished_at.is_some());
    assert!(!exited.timed_out);

    let LogSlice::Single(slice) = mgr
        .get_log(&session.id, LogStream::Stdout, 0, 100)
        .unwrap()
    else {
        panic!("expected single stream");
    };
    assert_eq!(slice.output, "hello");
}

#[tokio::test]
async fn test_pre_generated_id_is_used() {
    let mgr = manager();
    let session = mgr
        .start_session(StartSession {
            id: Some("feedfacefeedfacefeedfacefeedface".to_string()),
            command: "true".to_string(),
            cwd: std::env::temp_dir(),
            timeout_ms: 5_000,
            env: HashMap::new(),
        })
        .unwrap();
    assert_eq!(session.id, "feedfacefeedfacefeedfacefeedface");
}

#[tokio::test]
async fn test_write_and_submit_reaches_stdin() {
    let mgr = manager();
    let session = start(&mgr, "cat");
    mgr.write_to_session(&session.id, "hello", true).await.unwrap();
    wait_stdout_contains(&mgr, &session.id, "hello\n").await;

    // ctrl-d closes stdin; cat exits cleanly
    mgr.send_keys(&session.id, "ctrl-d").await.unwrap();
    let exited = wait_exited(&mgr, &session.id).await;
    assert_eq!(exited.exit_code, Some(0));
}

#[tokio::test]
async fn test_ctrl_c_interrupts() {
    let mgr = manager();
    let session = start(&mgr, "sleep 30");
    // Give the shell a moment to exec the child
    tokio::time::sleep(Duration::from_millis(300)).await;
    mgr.send_keys(&session.id, "ctrl-c").await.unwrap();
    let exited = wait_exited(&mgr, &session.id).await;
    assert_ne!(exited.exit_code, Some(0));
}

#[tokio::test]
async fn test_unknown_key_fails() {
    let mgr = manager();
    let session = start(&mgr, "cat");
    let err = mgr.send_keys(&session.id, "ctrl-q").await.unwrap_err();
    assert!(matches!(err, RuntimeError::UnknownKey(_)));
    mgr.stop_session(&session.id, true).unwrap();
}

#[tokio::test]
async fn test_write_to_unknown_session() {
    let mgr = manager();
    let err = mgr.write_to_session("missing", "x", false).await.unwrap_err();
    assert!(matches!(err, RuntimeError::NotFound(_)));
}

#[tokio::test]
async fn test_write_to_exited_session_fails() {
    let mgr = manager();
    let session = start(&mgr, "true");
    wait_exited(&mgr, &session.id).await;
    let err = mgr.write_to_session(&session.id, "x", false).await.unwrap_err();
    assert!(matches!(err, RuntimeError::NotRunning(_)));
}

#[tokio::test]
async fn test_timeout_marks_session() {
    let mgr = manager();
    let session = mgr
        .start_session(StartSession {
            id: None,
            command: "sleep 30".to_string(),
            cwd: std::env::temp_dir(),
            timeout_ms: 300,
            env: HashMap::new(),
        })
        .unwrap();
    let exited = wait_exited(&mgr, &session.id).await;
    assert!(exited.timed_out);
}

#[tokio::test]
async fn test_stop_session_terminates() {
    let mgr = manager();
    let session = start(&mgr, "sleep 30");
    mgr.stop_session(&session.id, false).unwrap();
    let exited = wait_exited(&mgr, &session.id).await;
    assert_ne!(exited.exit_code, Some(0));

    // Idempotent on an exited session
    mgr.stop_session(&session.id, false).unwrap();
}

#[tokio::test]
async fn test_force_stop_kills_immediately() {
    let mgr = manager();
    let session = start(&mgr, "sleep 30");
    mgr.stop_session(&session.id, true).unwrap();
    wait_exited(&mgr, &session.id).await;
}

#[tokio::test]
async fn test_log_paging_both_streams() {
    let mgr = manager();
    let session = start(&mgr, "printf 0123456789; printf abcdefghij >&2");
    wait_exited(&mgr, &session.id).await;

    let LogSlice::Single(out) = mgr
        .get_log(&session.id, LogStream::Stdout, 2, 4)
        .unwrap()
    else {
        panic!("expected single");
    };
    assert_eq!(out.output, "2345");
    assert_eq!(out.total, 10);
    assert_eq!(out.next_offset, 6);
    assert!(out.has_more);

    let LogSlice::Both { stdout, stderr } = mgr
        .get_log(&session.id, LogStream::Both, 3, 4)
        .unwrap()
    else {
        panic!("expected both");
    };
    assert_eq!(stdout.output, "3456");
    assert_eq!(stderr.output, "defg");
}

#[tokio::test]
async fn test_exit_event_and_listener_fan_out() {
    let mgr = manager();
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_clone = Arc::clone(&seen);
    let listener = mgr.add_exit_listener(move |summary| {
        assert_eq!(summary.exit_code, Some(0));
        seen_clone.fetch_add(1, Ordering::SeqCst);
    });

    let baseline = mgr.latest_cursor();
    let session = start(&mgr, "true");
    wait_exited(&mgr, &session.id).await;

    let events = mgr.list_events(baseline, None);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].summary.session_id, session.id);
    assert!(events[0].cursor > baseline);
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    // Detached listeners stop firing
    mgr.remove_exit_listener(listener);
    let session = start(&mgr, "true");
    wait_exited(&mgr, &session.id).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panicking_listener_is_swallowed() {
    let mgr = manager();
    mgr.add_exit_listener(|_| panic!("listener bug"));
    let session = start(&mgr, "true");
    // Finalization must survive the panic and still mark the exit
    let exited = wait_exited(&mgr, &session.id).await;
    assert_eq!(exited.status, SessionStatus::Exited);
}

#[tokio::test]
async fn test_list_sessions_sorted_and_paged() {
    let mgr = manager();
    let a = start(&mgr, "true");
    wait_exited(&mgr, &a.id).await;
    let b = start(&mgr, "cat");

    let page = mgr.list_sessions(None, 0, None);
    assert_eq!(page.total, 2);

    let running = mgr.list_sessions(Some(SessionStatus::Running), 0, None);
    assert_eq!(running.total, 1);
    assert_eq!(running.sessions[0].id, b.id);

    let paged = mgr.list_sessions(None, 1, Some(1));
    assert_eq!(paged.sessions.len(), 1);
    assert!(!paged.has_more);

    mgr.stop_session(&b.id, true).unwrap();
}

#[tokio::test]
async fn test_prune_enforces_cap() {
    let mgr = SessionManager::new(
        SessionManagerConfig {
            max_sessions: 2,
            exited_ttl_ms: 3_600_000,
        },
        Arc::new(SystemClock),
    );

    let first = start(&mgr, "true");
    wait_exited(&mgr, &first.id).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = start(&mgr, "true");
    wait_exited(&mgr, &second.id).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Starting a third prunes the oldest to make room
    let third = start(&mgr, "true");
    wait_exited(&mgr, &third.id).await;

    assert!(mgr.session_count() <= 2);
    assert!(mgr.get_session(&first.id).is_none());
    assert!(mgr.get_session(&third.id).is_some());
}

#[tokio::test]
async fn test_prune_removes_expired_sessions() {
    let clock = Arc::new(companion_core::FakeClock::at(1_000));
    let mgr = SessionManager::new(SessionManagerConfig::default(), clock.clone());
    let session = start(&mgr, "true");
    wait_exited(&mgr, &session.id).await;

    clock.advance(3_600_001);
    mgr.prune(0);
    assert!(mgr.get_session(&session.id).is_none());
}
