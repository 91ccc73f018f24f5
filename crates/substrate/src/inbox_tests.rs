// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use anima_core::FakeClock;

const JAN_2026: u64 = 1_767_225_600_000;

fn setup() -> (tempfile::TempDir, AgoraInbox<FakeClock>) {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    clock.set_epoch_ms(JAN_2026);
    let substrate = Substrate::new(dir.path(), clock);
    (dir, AgoraInbox::new(substrate))
}

fn entry(id: &str, text: &str) -> InboxEntry {
    InboxEntry {
        envelope_id: id.to_string(),
        sender: "ab12cd34".to_string(),
        timestamp_ms: JAN_2026,
        text: text.to_string(),
    }
}

#[tokio::test]
async fn add_unread_prepends() {
    let (_dir, inbox) = setup();
    inbox.substrate.init().await.unwrap();

    inbox.add_unread(&entry("env-1", "first")).await.unwrap();
    inbox.add_unread(&entry("env-2", "second")).await.unwrap();

    let unread = inbox.unread().await.unwrap();
    assert_eq!(unread.len(), 2);
    assert!(unread[0].contains("(env-2)"), "newest first: {unread:?}");
    assert!(unread[1].contains("(env-1)"));
}

#[tokio::test]
async fn add_works_without_prior_init() {
    let (_dir, inbox) = setup();
    // No init: the inbox file does not exist yet
    assert!(inbox.add_unread(&entry("env-1", "hi")).await.unwrap());
    let unread = inbox.unread().await.unwrap();
    assert_eq!(unread.len(), 1);
}

#[tokio::test]
async fn duplicate_envelope_id_is_dropped() {
    let (_dir, inbox) = setup();
    inbox.substrate.init().await.unwrap();

    assert!(inbox.add_unread(&entry("env-1", "hi")).await.unwrap());
    assert!(!inbox.add_unread(&entry("env-1", "hi again")).await.unwrap());
    assert_eq!(inbox.unread().await.unwrap().len(), 1);
}

#[tokio::test]
async fn mark_read_moves_exactly_one_entry() {
    let (_dir, inbox) = setup();
    inbox.substrate.init().await.unwrap();

    inbox.add_unread(&entry("env-1", "hello")).await.unwrap();
    assert!(inbox.mark_read("env-1", None).await.unwrap());

    let text = std::fs::read_to_string(
        inbox.substrate.path(DocKind::AgoraInbox),
    )
    .unwrap();
    let unread_section = text.split("## Read").next().unwrap();
    let read_section = text.split("## Read").nth(1).unwrap();
    assert!(!unread_section.contains("(env-1)"));
    assert_eq!(read_section.matches("(env-1)").count(), 1);
}

#[tokio::test]
async fn mark_read_annotates_reply_timestamp() {
    let (_dir, inbox) = setup();
    inbox.substrate.init().await.unwrap();

    inbox.add_unread(&entry("env-1", "ping")).await.unwrap();
    inbox
        .mark_read("env-1", Some(JAN_2026 + 65_000))
        .await
        .unwrap();

    let text = std::fs::read_to_string(
        inbox.substrate.path(DocKind::AgoraInbox),
    )
    .unwrap();
    assert!(text.contains("(replied 2026-01-01T00:01:05Z)"));
}

#[tokio::test]
async fn mark_read_is_idempotent() {
    let (_dir, inbox) = setup();
    inbox.substrate.init().await.unwrap();

    inbox.add_unread(&entry("env-1", "hello")).await.unwrap();
    assert!(inbox.mark_read("env-1", None).await.unwrap());
    assert!(!inbox.mark_read("env-1", None).await.unwrap());
    assert!(!inbox.mark_read("env-404", None).await.unwrap());
}

#[tokio::test]
async fn dropped_duplicate_after_read_stays_read() {
    let (_dir, inbox) = setup();
    inbox.substrate.init().await.unwrap();

    inbox.add_unread(&entry("env-1", "hello")).await.unwrap();
    inbox.mark_read("env-1", None).await.unwrap();
    // Redelivery of an already-read envelope must not resurface it
    assert!(!inbox.add_unread(&entry("env-1", "hello")).await.unwrap());
    assert!(inbox.unread().await.unwrap().is_empty());
}

#[tokio::test]
async fn multiline_text_is_flattened() {
    let (_dir, inbox) = setup();
    inbox.substrate.init().await.unwrap();

    inbox
        .add_unread(&entry("env-1", "line one\nline two"))
        .await
        .unwrap();
    let unread = inbox.unread().await.unwrap();
    assert!(unread[0].contains("line one line two"));
}
