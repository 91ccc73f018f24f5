// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn session_id_display() {
    let id = SessionId::new("sess-1");
    assert_eq!(id.to_string(), "sess-1");
}

#[test]
fn session_id_short_truncates() {
    let id = SessionId::new("0123456789abcdef");
    assert_eq!(id.short(8), "01234567");
    assert_eq!(id.short(64), "0123456789abcdef");
}

#[test]
fn session_id_serde() {
    let id = SessionId::new("my-session");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"my-session\"");

    let parsed: SessionId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn uuid_gen_produces_unique_ids() {
    let gen = UuidIdGen;
    let a = gen.next();
    let b = gen.next();
    assert_ne!(a, b);
    assert_eq!(a.len(), 36);
}

#[test]
fn sequential_gen_counts_up() {
    let gen = SequentialIdGen::new("env");
    assert_eq!(gen.next(), "env-1");
    assert_eq!(gen.next(), "env-2");

    // Clones share the counter
    let clone = gen.clone();
    assert_eq!(clone.next(), "env-3");
    assert_eq!(gen.next(), "env-4");
}
