// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::fake::{FakeProcessRunner, FakeScript};
use anima_core::FakeClock;
use tokio::sync::mpsc;

fn launcher(
    runner: FakeProcessRunner,
    dir: &Path,
    wall_timeout_ms: u64,
    grace_ms: u64,
) -> SessionLauncher<FakeProcessRunner, FakeClock> {
    SessionLauncher::new(
        runner,
        FakeClock::new(),
        LauncherConfig {
            command: "reason".to_string(),
            working_dir: dir.to_path_buf(),
            wall_timeout_ms,
            shutdown_grace_ms: grace_ms,
        },
    )
}

#[tokio::test]
async fn completes_and_streams_typed_events() {
    let dir = tempfile::tempdir().unwrap();
    let runner = FakeProcessRunner::new();
    runner.push_script(FakeScript::completing(&[
        r#"{"type":"text","content":"planning"}"#,
        r#"{"type":"completion"}"#,
    ]));

    let (tx, mut rx) = mpsc::channel(16);
    let launcher = launcher(runner, dir.path(), 5_000, 50);
    let session = launcher
        .launch(anima_core::Role::Ego, "default", "do the thing", tx)
        .await
        .unwrap();

    let outcome = session.wait().await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.exit_code, Some(0));
    assert!(!outcome.timed_out);
    assert!(outcome.stdout.contains("planning"));

    let first = rx.recv().await.unwrap();
    assert_eq!(
        first,
        SessionEvent::Text {
            content: "planning".to_string()
        }
    );
    let second = rx.recv().await.unwrap();
    assert!(matches!(second, SessionEvent::Completed { .. }));
}

#[tokio::test]
async fn single_flight_while_active() {
    let dir = tempfile::tempdir().unwrap();
    let runner = FakeProcessRunner::new();
    runner.push_script(FakeScript::hanging());

    let launcher = launcher(runner, dir.path(), 60_000, 20);
    let (tx, _rx) = mpsc::channel(16);
    let session = launcher
        .launch(anima_core::Role::Ego, "default", "p", tx.clone())
        .await
        .unwrap();

    let err = launcher
        .launch(anima_core::Role::Subconscious, "default", "q", tx)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Busy(_)));
    assert_eq!(launcher.active_session().as_ref(), Some(session.id()));

    session.cancel();
    session.wait().await.unwrap();
    assert!(launcher.active_session().is_none());
}

#[tokio::test]
async fn cancel_terminates_with_sigterm_only() {
    let dir = tempfile::tempdir().unwrap();
    let runner = FakeProcessRunner::new();
    runner.push_script(FakeScript::hanging());

    let launcher = launcher(runner.clone(), dir.path(), 60_000, 200);
    let (tx, _rx) = mpsc::channel(16);
    let session = launcher
        .launch(anima_core::Role::Ego, "default", "p", tx)
        .await
        .unwrap();

    session.cancel();
    let outcome = session.wait().await.unwrap();

    assert!(outcome.cancelled);
    assert!(!outcome.success);
    let sigs: Vec<_> = runner.signals().iter().map(|s| s.sig).collect();
    assert_eq!(sigs, vec![Sig::Term]);
}

#[tokio::test]
async fn sigkill_after_grace_when_term_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let runner = FakeProcessRunner::new();
    runner.push_script(FakeScript::hanging().with_ignore_term());

    let launcher = launcher(runner.clone(), dir.path(), 60_000, 30);
    let (tx, _rx) = mpsc::channel(16);
    let session = launcher
        .launch(anima_core::Role::Ego, "default", "p", tx)
        .await
        .unwrap();

    session.cancel();
    let outcome = session.wait().await.unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.exit_code, None);
    let sigs: Vec<_> = runner.signals().iter().map(|s| s.sig).collect();
    assert_eq!(sigs, vec![Sig::Term, Sig::Kill]);
}

#[tokio::test]
async fn wall_timeout_marks_timed_out() {
    let dir = tempfile::tempdir().unwrap();
    let runner = FakeProcessRunner::new();
    runner.push_script(FakeScript::hanging());

    let launcher = launcher(runner, dir.path(), 40, 20);
    let (tx, _rx) = mpsc::channel(16);
    let session = launcher
        .launch(anima_core::Role::Ego, "default", "p", tx)
        .await
        .unwrap();

    let outcome = session.wait().await.unwrap();
    assert!(outcome.timed_out);
    assert!(!outcome.success);
}

#[tokio::test]
async fn inject_appends_in_call_order_then_refuses() {
    let dir = tempfile::tempdir().unwrap();
    let runner = FakeProcessRunner::new();
    runner.push_script(FakeScript::hanging());

    let launcher = launcher(runner, dir.path(), 60_000, 20);
    let (tx, _rx) = mpsc::channel(16);
    let session = launcher
        .launch(anima_core::Role::Ego, "default", "p", tx)
        .await
        .unwrap();

    assert!(session.inject("first"));
    assert!(session.inject("second"));
    assert_eq!(
        read_injected_lines(session.injection_path()),
        vec!["first".to_string(), "second".to_string()]
    );

    let path = session.injection_path().to_path_buf();
    session.cancel();
    let outcome = session.wait().await.unwrap();
    assert!(outcome.cancelled);
    // The side channel survives for prompt assembly
    assert_eq!(read_injected_lines(&path).len(), 2);
}

#[tokio::test]
async fn inject_false_after_completion() {
    let dir = tempfile::tempdir().unwrap();
    let runner = FakeProcessRunner::new();
    runner.push_script(FakeScript::completing(&[r#"{"type":"completion"}"#]));

    let launcher = launcher(runner, dir.path(), 5_000, 20);
    let (tx, _rx) = mpsc::channel(16);
    let session = launcher
        .launch(anima_core::Role::Ego, "default", "p", tx)
        .await
        .unwrap();

    // Let the driver observe the exit
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(session.is_terminated());
    assert!(!session.inject("too late"));
}

#[tokio::test]
async fn rate_limit_from_completion_surfaces_in_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let runner = FakeProcessRunner::new();
    runner.push_script(FakeScript::completing(&[
        r#"{"type":"completion","rateLimitUntil":"2030-01-01T00:00:00Z"}"#,
    ]));

    let launcher = launcher(runner, dir.path(), 5_000, 20);
    let (tx, _rx) = mpsc::channel(16);
    let session = launcher
        .launch(anima_core::Role::Ego, "default", "p", tx)
        .await
        .unwrap();

    let outcome = session.wait().await.unwrap();
    assert_eq!(
        outcome.rate_limit_until.as_deref(),
        Some("2030-01-01T00:00:00Z")
    );
}

#[tokio::test]
async fn role_cap_bounds_effective_timeout() {
    // Superego's cap is 10 minutes; a 60-minute wall timeout must not
    // extend it. We can't wait 10 minutes in a test, so assert on the
    // spawn args instead: the launcher passes role and model through.
    let dir = tempfile::tempdir().unwrap();
    let runner = FakeProcessRunner::new();
    runner.push_script(FakeScript::completing(&[]));

    let launcher = launcher(runner.clone(), dir.path(), 3_600_000, 20);
    let (tx, _rx) = mpsc::channel(16);
    let session = launcher
        .launch(anima_core::Role::Superego, "deep", "audit", tx)
        .await
        .unwrap();
    session.wait().await.unwrap();

    let spawns = runner.spawns();
    assert_eq!(spawns.len(), 1);
    let args = &spawns[0].args;
    assert!(args.contains(&"superego".to_string()));
    assert!(args.contains(&"deep".to_string()));
    assert_eq!(args.last().map(String::as_str), Some("audit"));
}
