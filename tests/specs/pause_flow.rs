// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pause during a live session: the injected message reaches the
//! session and the conversation record, the pause escalates through
//! SIGTERM, and nothing is marked `[UNPROCESSED]`.

use anima_bus::Provider as _;
use anima_core::{kinds, BusMessage, Config, DocKind, FakeClock, Role};
use anima_daemon::control::LoopControl;
use anima_daemon::providers::{ConversationOnPauseProvider, SessionInjectionProvider};
use anima_daemon::roles::RoleAgents;
use anima_session::{
    read_injected_lines, FakeProcessRunner, FakeScript, LauncherConfig, SessionLauncher, Sig,
};
use anima_substrate::{ConversationLog, Substrate};
use std::time::Duration;

const JAN_2026: u64 = 1_767_225_600_000;

#[tokio::test]
async fn pause_during_session() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    clock.set_epoch_ms(JAN_2026);

    let substrate = Substrate::new(dir.path().join("substrate"), clock.clone());
    substrate.init().await.unwrap();
    substrate
        .overwrite(DocKind::Plan, "# Plan\n\n## Tasks\n\n- [ ] busy work\n")
        .await
        .unwrap();
    let conversation = ConversationLog::new(substrate.clone(), 400);

    let runner = FakeProcessRunner::new();
    runner.push_script(FakeScript::hanging());
    let launcher = SessionLauncher::new(
        runner.clone(),
        clock.clone(),
        LauncherConfig {
            command: "reason".to_string(),
            working_dir: dir.path().to_path_buf(),
            wall_timeout_ms: 60_000,
            shutdown_grace_ms: 50,
        },
    );
    let control = LoopControl::new(JAN_2026);
    control.start(JAN_2026).unwrap();

    let agents = RoleAgents::new(
        substrate.clone(),
        conversation.clone(),
        launcher,
        control.clone(),
        clock.clone(),
        Config::default(),
    );

    // The Ego session hangs until cancelled
    let agents_for_run = agents.clone();
    let run = tokio::spawn(async move { agents_for_run.run_role(Role::Ego, None).await });

    // Wait for the session to be live
    for _ in 0..100 {
        if control.has_active_session() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(control.has_active_session(), "session never registered");

    // "hello" arrives over the bus fan-out: injection + conversation
    let injection = SessionInjectionProvider::new(control.clone(), clock.clone());
    let recording = ConversationOnPauseProvider::new(control.clone(), conversation.clone());
    let msg = BusMessage::new(
        kinds::USER_MESSAGE,
        serde_json::json!({"text": "hello"}),
        JAN_2026,
    );
    injection.deliver(msg.clone()).await.unwrap();
    recording.deliver(msg).await.unwrap();

    // Delivered into the live session's side channel
    let session_dir = dir.path().join(".session");
    let inject_file = std::fs::read_dir(&session_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .find(|e| e.file_name().to_string_lossy().starts_with("inject-"))
        .expect("injection channel exists");
    assert_eq!(
        read_injected_lines(&inject_file.path()),
        vec!["hello".to_string()]
    );

    // Pause: cancels the session with the grace escalation
    control.pause(JAN_2026 + 10).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("session never ended")
        .unwrap()
        .unwrap();
    assert!(outcome.outcome.unwrap().cancelled);

    let signals: Vec<Sig> = runner.signals().iter().map(|s| s.sig).collect();
    assert_eq!(signals.first(), Some(&Sig::Term));

    // The conversation holds the message once, as [USER], not
    // [UNPROCESSED]
    let text = std::fs::read_to_string(substrate.path(DocKind::Conversation)).unwrap();
    let hello_lines: Vec<&str> = text.lines().filter(|l| l.contains("hello")).collect();
    assert_eq!(hello_lines.len(), 1);
    assert!(hello_lines[0].contains("[USER] hello"));
    assert!(!hello_lines[0].contains("[UNPROCESSED]"));

    // A message arriving after the pause is recorded as unprocessed
    let late = BusMessage::new(
        kinds::USER_MESSAGE,
        serde_json::json!({"text": "anyone home?"}),
        JAN_2026 + 20,
    );
    recording.deliver(late).await.unwrap();
    let text = std::fs::read_to_string(substrate.path(DocKind::Conversation)).unwrap();
    assert!(text.contains("[USER] [UNPROCESSED] anyone home?"));
}
