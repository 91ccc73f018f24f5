// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use anima_agora::EnvelopeKind;
use anima_core::FakeClock;
use serde_json::json;
use std::time::Duration;

const JAN_2026: u64 = 1_767_225_600_000;

fn state() -> (RelayState<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    clock.set_epoch_ms(JAN_2026);
    let state = RelayState::new(clock.clone(), RelayConfig::new("test-secret"));
    (state, clock)
}

fn signed_envelope(keys: &AgentKeys, id: &str) -> Envelope {
    let mut env = Envelope::new(
        EnvelopeKind::Request,
        keys.fingerprint(),
        JAN_2026,
        json!({"q": 1}),
    );
    env.id = id.to_string();
    keys.sign(&mut env).unwrap();
    env
}

fn register_request(keys: &AgentKeys, name: &str) -> RegisterRequest {
    let mut challenge = Envelope::new(
        EnvelopeKind::Verify,
        keys.fingerprint(),
        JAN_2026,
        json!({"name": name}),
    );
    keys.sign(&mut challenge).unwrap();
    RegisterRequest {
        public_key: keys.public_key_hex(),
        private_key: keys.secret_hex(),
        name: name.to_string(),
        envelope: challenge,
    }
}

#[test]
fn register_issues_working_token() {
    let (state, _clock) = state();
    let keys = AgentKeys::generate();

    let resp = state.register_rest(register_request(&keys, "alpha")).unwrap();
    assert!(resp.ok);
    assert_eq!(resp.expires_at_ms, JAN_2026 + 3_600_000);

    let subject = state.authorize(&resp.token).unwrap();
    assert_eq!(subject, keys.public_key_hex());
    assert_eq!(state.session_name(&subject).as_deref(), Some("alpha"));
}

#[test]
fn register_rejects_mismatched_private_key() {
    let (state, _clock) = state();
    let keys = AgentKeys::generate();
    let other = AgentKeys::generate();

    let mut req = register_request(&keys, "alpha");
    req.private_key = other.secret_hex();
    assert!(matches!(
        state.register_rest(req),
        Err(crate::RelayError::Invalid(_))
    ));
}

#[test]
fn register_rejects_bad_challenge() {
    let (state, _clock) = state();
    let keys = AgentKeys::generate();

    let mut req = register_request(&keys, "alpha");
    req.envelope.payload = json!({"name": "tampered"});
    assert!(state.register_rest(req).is_err());
}

#[test]
fn reregistration_revokes_prior_token() {
    let (state, _clock) = state();
    let keys = AgentKeys::generate();

    let first = state.register_rest(register_request(&keys, "alpha")).unwrap();
    let second = state.register_rest(register_request(&keys, "alpha")).unwrap();

    assert!(state.authorize(&first.token).is_err());
    assert!(state.authorize(&second.token).is_ok());
}

#[test]
fn disconnect_revokes_until_expiry() {
    let (state, clock) = state();
    let keys = AgentKeys::generate();

    let resp = state.register_rest(register_request(&keys, "alpha")).unwrap();
    state.disconnect_rest(&keys.public_key_hex());

    // Revoked while the token is otherwise valid
    assert!(state.authorize(&resp.token).is_err());

    // After natural expiry the token fails on exp, not the list; either
    // way it stays unusable
    clock.advance(Duration::from_secs(3_601));
    assert!(state.authorize(&resp.token).is_err());
}

#[test]
fn route_to_rest_buffers_and_polls() {
    let (state, _clock) = state();
    let receiver = AgentKeys::generate();
    let sender = AgentKeys::generate();
    state
        .register_rest(register_request(&receiver, "receiver"))
        .unwrap();

    let env = signed_envelope(&sender, "env-1");
    let outcome = state.route(&receiver.public_key_hex(), env).unwrap();
    assert_eq!(outcome, SendOutcome::Buffered);

    let (messages, has_more) = state
        .poll_messages(&receiver.public_key_hex(), None, 100)
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].envelope.id, "env-1");
    assert!(!has_more);

    // Drained: a second poll is empty
    let (messages, _) = state
        .poll_messages(&receiver.public_key_hex(), None, 100)
        .unwrap();
    assert!(messages.is_empty());
}

#[test]
fn duplicate_envelope_id_is_dropped_before_routing() {
    let (state, _clock) = state();
    let receiver = AgentKeys::generate();
    let sender = AgentKeys::generate();
    state
        .register_rest(register_request(&receiver, "receiver"))
        .unwrap();

    let env = signed_envelope(&sender, "env-123");
    assert_eq!(
        state.route(&receiver.public_key_hex(), env.clone()).unwrap(),
        SendOutcome::Buffered
    );
    assert_eq!(
        state.route(&receiver.public_key_hex(), env).unwrap(),
        SendOutcome::Duplicate
    );

    let (messages, _) = state
        .poll_messages(&receiver.public_key_hex(), None, 100)
        .unwrap();
    assert_eq!(messages.len(), 1);
}

#[test]
fn buffer_evicts_fifo_at_capacity() {
    let (state, _clock) = state();
    let receiver = AgentKeys::generate();
    let sender = AgentKeys::generate();
    state
        .register_rest(register_request(&receiver, "receiver"))
        .unwrap();

    for i in 0..105 {
        let env = signed_envelope(&sender, &format!("env-{i}"));
        state.route(&receiver.public_key_hex(), env).unwrap();
    }

    let (messages, has_more) = state
        .poll_messages(&receiver.public_key_hex(), None, 100)
        .unwrap();
    assert_eq!(messages.len(), 100);
    // The oldest five were evicted
    assert_eq!(messages[0].envelope.id, "env-5");
    assert!(!has_more);
}

#[test]
fn poll_with_since_filters_without_clearing() {
    let (state, clock) = state();
    let receiver = AgentKeys::generate();
    let sender = AgentKeys::generate();
    state
        .register_rest(register_request(&receiver, "receiver"))
        .unwrap();

    for i in 0..3u64 {
        let mut env = Envelope::new(
            EnvelopeKind::Request,
            sender.fingerprint(),
            JAN_2026 + i * 1000,
            json!({"seq": i}),
        );
        env.id = format!("env-{i}");
        sender.sign(&mut env).unwrap();
        state.route(&receiver.public_key_hex(), env).unwrap();
        clock.advance(Duration::from_secs(1));
    }

    let (messages, _) = state
        .poll_messages(&receiver.public_key_hex(), Some(JAN_2026), 100)
        .unwrap();
    assert_eq!(messages.len(), 2, "timestamp > since filter");

    // Nothing was cleared
    let (all, _) = state
        .poll_messages(&receiver.public_key_hex(), None, 100)
        .unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn route_unknown_recipient_errors() {
    let (state, _clock) = state();
    let sender = AgentKeys::generate();
    let env = signed_envelope(&sender, "env-1");
    assert!(matches!(
        state.route("nobody", env),
        Err(crate::RelayError::UnknownRecipient(_))
    ));
}

#[tokio::test]
async fn route_prefers_live_ws_peer() {
    let (state, _clock) = state();
    let sender = AgentKeys::generate();
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    state.register_ws("peer-key", tx, 1);

    let env = signed_envelope(&sender, "env-1");
    assert_eq!(state.route("peer-key", env).unwrap(), SendOutcome::Delivered);

    match rx.recv().await.unwrap() {
        ServerFrame::Message { envelope } => assert_eq!(envelope.id, "env-1"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn route_to_closed_ws_is_recipient_gone() {
    let (state, _clock) = state();
    let sender = AgentKeys::generate();
    let (tx, rx) = tokio::sync::mpsc::channel(8);
    drop(rx);
    state.register_ws("peer-key", tx, 1);

    let env = signed_envelope(&sender, "env-1");
    assert!(matches!(
        state.route("peer-key", env),
        Err(crate::RelayError::RecipientGone)
    ));
}

#[tokio::test]
async fn ws_last_write_wins_and_nonce_guards_unregister() {
    let (state, _clock) = state();
    let (tx1, _rx1) = tokio::sync::mpsc::channel(8);
    let (tx2, _rx2) = tokio::sync::mpsc::channel(8);

    state.register_ws("peer-key", tx1, 1);
    state.register_ws("peer-key", tx2, 2);
    assert_eq!(state.ws_peer_count(), 1);

    // The stale connection's cleanup must not remove the new one
    state.unregister_ws("peer-key", 1);
    assert_eq!(state.ws_peer_count(), 1);
    state.unregister_ws("peer-key", 2);
    assert_eq!(state.ws_peer_count(), 0);
}

#[test]
fn peers_union_dedups_and_excludes_caller() {
    let (state, _clock) = state();
    let rest_a = AgentKeys::generate();
    let rest_b = AgentKeys::generate();
    state.register_rest(register_request(&rest_a, "a")).unwrap();
    state.register_rest(register_request(&rest_b, "b")).unwrap();

    // rest_b also connects over WS: one entry, ws wins
    let (tx, _rx) = tokio::sync::mpsc::channel(1);
    state.register_ws(&rest_b.public_key_hex(), tx, 1);

    let peers = state.peers_for(&rest_a.public_key_hex());
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].public_key, rest_b.public_key_hex());
    assert_eq!(peers[0].transport, "ws");
}

#[test]
fn validate_outbound_enforces_sender_binding() {
    let (state, _clock) = state();
    let keys = AgentKeys::generate();
    let other = AgentKeys::generate();

    let env = signed_envelope(&keys, "env-1");
    assert!(state.validate_outbound(&env, &keys.public_key_hex()).is_ok());
    // A connection cannot relay someone else's envelope as its own
    assert!(state
        .validate_outbound(&env, &other.public_key_hex())
        .is_err());

    let mut unsigned = env.clone();
    unsigned.signature = None;
    assert!(state
        .validate_outbound(&unsigned, &keys.public_key_hex())
        .is_err());
}

#[test]
fn rate_limit_sliding_window() {
    let (state, clock) = state();
    let addr: IpAddr = "10.0.0.1".parse().unwrap();

    for _ in 0..60 {
        state.check_rate(addr).unwrap();
    }
    assert!(matches!(
        state.check_rate(addr),
        Err(crate::RelayError::RateLimited)
    ));

    // A different source is unaffected
    let other: IpAddr = "10.0.0.2".parse().unwrap();
    state.check_rate(other).unwrap();

    // The window slides
    clock.advance(Duration::from_secs(61));
    state.check_rate(addr).unwrap();
}

#[test]
fn sign_for_session_uses_held_private_key() {
    let (state, _clock) = state();
    let keys = AgentKeys::generate();
    state.register_rest(register_request(&keys, "alpha")).unwrap();

    let mut env = Envelope::new(
        EnvelopeKind::Publish,
        keys.fingerprint(),
        JAN_2026,
        json!({"x": 1}),
    );
    state
        .sign_for_session(&keys.public_key_hex(), &mut env)
        .unwrap();
    anima_agora::keys::verify_envelope(&env, &keys.public_key_hex()).unwrap();
}
