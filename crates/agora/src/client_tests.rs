// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::envelope::EnvelopeKind;
use futures_util::{SinkExt as _, StreamExt as _};
use serde_json::json;
use tokio::net::TcpListener;
use yare::parameterized;

#[parameterized(
    doubles = { 1_000, 300_000, 2_000 },
    doubles_again = { 4_000, 300_000, 8_000 },
    caps = { 200_000, 300_000, 300_000 },
    stays_capped = { 300_000, 300_000, 300_000 },
)]
fn backoff_schedule(current: u64, cap: u64, expected: u64) {
    assert_eq!(next_backoff(current, cap), expected);
}

fn test_config(addr: std::net::SocketAddr) -> RelayClientConfig {
    RelayClientConfig {
        url: format!("ws://{addr}"),
        heartbeat_interval_ms: 60_000,
        backoff_initial_ms: 10,
        backoff_cap_ms: 100,
        dedup_capacity: 64,
    }
}

fn signed(keys: &AgentKeys, id: &str) -> Envelope {
    let mut env = Envelope::new(
        EnvelopeKind::Publish,
        keys.fingerprint(),
        1_000,
        json!({"note": "hi"}),
    );
    env.id = id.to_string();
    keys.sign(&mut env).unwrap();
    env
}

/// Accept one WS connection and run `server` against it.
async fn with_relay_stub<F, Fut>(server: F) -> (std::net::SocketAddr, tokio::task::JoinHandle<()>)
where
    F: FnOnce(
            tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
        ) -> Fut
        + Send
        + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        server(ws).await;
    });
    (addr, handle)
}

async fn read_client_frame(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
) -> ClientFrame {
    loop {
        match ws.next().await.expect("stream open").expect("frame ok") {
            tokio_tungstenite::tungstenite::Message::Text(text) => {
                return serde_json::from_str(&text).unwrap();
            }
            _ => continue,
        }
    }
}

async fn send_server_frame(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    frame: &ServerFrame,
) {
    ws.send(tokio_tungstenite::tungstenite::Message::Text(
        serde_json::to_string(frame).unwrap().into(),
    ))
    .await
    .unwrap();
}

#[tokio::test]
async fn send_fails_fast_when_not_connected() {
    let keys = AgentKeys::generate();
    let (client, _rx) = RelayClient::new(
        RelayClientConfig::new("ws://127.0.0.1:1"),
        keys.clone(),
        PeerRegistry::new(),
        UnknownSenderPolicy::Reject,
    );
    let env = signed(&keys, "env-1");
    assert!(matches!(
        client.send("peer", env),
        Err(AgoraError::NotConnected)
    ));
}

#[tokio::test]
async fn registers_delivers_verified_and_dedups() {
    let agent = AgentKeys::generate();
    let peer = AgentKeys::generate();
    let peer_for_server = peer.clone();

    let (addr, server) = with_relay_stub(move |mut ws| async move {
        // First frame must be registration with the agent's public key
        let frame = read_client_frame(&mut ws).await;
        assert!(matches!(frame, ClientFrame::Register { .. }));
        send_server_frame(&mut ws, &ServerFrame::Registered).await;

        // Deliver the same envelope twice, 50ms apart
        let env = signed(&peer_for_server, "env-123");
        send_server_frame(&mut ws, &ServerFrame::Message { envelope: env.clone() }).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        send_server_frame(&mut ws, &ServerFrame::Message { envelope: env }).await;

        // Expect an outbound message frame from the client
        let frame = read_client_frame(&mut ws).await;
        match frame {
            ClientFrame::Message { to, envelope } => {
                assert_eq!(to, "target-fp");
                assert_eq!(envelope.id, "env-out");
            }
            other => panic!("unexpected: {other:?}"),
        }
    })
    .await;

    let peers = PeerRegistry::new();
    peers.add(peer.fingerprint(), peer.public_key_hex());
    let (client, mut inbound) = RelayClient::new(
        test_config(addr),
        agent.clone(),
        peers,
        UnknownSenderPolicy::Reject,
    );
    let runner = tokio::spawn(client.clone().run());

    // Exactly one inbound message despite the duplicate
    let first = tokio::time::timeout(std::time::Duration::from_secs(2), inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.envelope.id, "env-123");
    assert!(first.verified);
    assert!(
        tokio::time::timeout(std::time::Duration::from_millis(200), inbound.recv())
            .await
            .is_err(),
        "duplicate was delivered"
    );

    assert!(client.is_connected());
    client.send("target-fp", signed(&agent, "env-out")).unwrap();

    server.await.unwrap();
    client.disconnect();
    tokio::time::timeout(std::time::Duration::from_secs(2), runner)
        .await
        .unwrap()
        .unwrap();
    assert!(!client.is_connected());
}

/// An envelope whose payload carries the sender's own public key, so
/// it can self-certify under the allow policy.
fn signed_with_key(keys: &AgentKeys, id: &str) -> Envelope {
    let mut env = Envelope::new(
        EnvelopeKind::Announce,
        keys.fingerprint(),
        1_000,
        json!({"text": "hi", "publicKey": keys.public_key_hex()}),
    );
    env.id = id.to_string();
    keys.sign(&mut env).unwrap();
    env
}

#[tokio::test]
async fn unknown_sender_policies() {
    // (policy, carries_key, expect_delivery, expect_verified)
    for (policy, carries_key, expect_delivery, expect_verified) in [
        // Self-certified envelope is delivered like a known peer's
        (UnknownSenderPolicy::Allow, true, true, true),
        // Without key material there is nothing to verify against
        (UnknownSenderPolicy::Allow, false, true, false),
        // Quarantine stays inbox-only even when the key is present
        (UnknownSenderPolicy::Quarantine, true, true, false),
        (UnknownSenderPolicy::Reject, true, false, false),
    ] {
        let agent = AgentKeys::generate();
        let stranger = AgentKeys::generate();
        let stranger_for_server = stranger.clone();

        let (addr, _server) = with_relay_stub(move |mut ws| async move {
            let _ = read_client_frame(&mut ws).await;
            send_server_frame(&mut ws, &ServerFrame::Registered).await;
            let env = if carries_key {
                signed_with_key(&stranger_for_server, "env-s")
            } else {
                signed(&stranger_for_server, "env-s")
            };
            send_server_frame(&mut ws, &ServerFrame::Message { envelope: env }).await;
            // Hold the socket open until the client is done
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        })
        .await;

        let (client, mut inbound) = RelayClient::new(
            test_config(addr),
            agent,
            PeerRegistry::new(), // stranger is not registered
            policy,
        );
        let _runner = tokio::spawn(client.clone().run());

        let received =
            tokio::time::timeout(std::time::Duration::from_millis(400), inbound.recv()).await;
        if expect_delivery {
            let msg = received.unwrap().unwrap();
            assert_eq!(msg.verified, expect_verified, "{policy:?} key={carries_key}");
        } else {
            assert!(received.is_err(), "{policy:?} delivered");
        }
        client.disconnect();
    }
}

#[tokio::test]
async fn allow_learns_peer_on_first_use() {
    let agent = AgentKeys::generate();
    let stranger = AgentKeys::generate();
    let stranger_for_server = stranger.clone();

    let (addr, _server) = with_relay_stub(move |mut ws| async move {
        let _ = read_client_frame(&mut ws).await;
        send_server_frame(&mut ws, &ServerFrame::Registered).await;
        // First envelope self-certifies; the follow-up carries no key
        // and must verify against the learned registry entry.
        let first = signed_with_key(&stranger_for_server, "env-first");
        send_server_frame(&mut ws, &ServerFrame::Message { envelope: first }).await;
        let second = signed(&stranger_for_server, "env-second");
        send_server_frame(&mut ws, &ServerFrame::Message { envelope: second }).await;
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    })
    .await;

    let (client, mut inbound) = RelayClient::new(
        test_config(addr),
        agent,
        PeerRegistry::new(),
        UnknownSenderPolicy::Allow,
    );
    let _runner = tokio::spawn(client.clone().run());

    let first = tokio::time::timeout(std::time::Duration::from_secs(2), inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.envelope.id, "env-first");
    assert!(first.verified);

    let second = tokio::time::timeout(std::time::Duration::from_secs(2), inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.envelope.id, "env-second");
    assert!(second.verified, "registry entry learned on first use");
    client.disconnect();
}

#[tokio::test]
async fn bad_signature_from_known_peer_is_dropped() {
    let agent = AgentKeys::generate();
    let peer = AgentKeys::generate();
    let peer_for_server = peer.clone();

    let (addr, _server) = with_relay_stub(move |mut ws| async move {
        let _ = read_client_frame(&mut ws).await;
        send_server_frame(&mut ws, &ServerFrame::Registered).await;
        let mut env = signed(&peer_for_server, "env-bad");
        env.payload = json!({"note": "tampered"});
        send_server_frame(&mut ws, &ServerFrame::Message { envelope: env }).await;
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    })
    .await;

    let peers = PeerRegistry::new();
    peers.add(peer.fingerprint(), peer.public_key_hex());
    let (client, mut inbound) = RelayClient::new(
        test_config(addr),
        agent,
        peers,
        UnknownSenderPolicy::Allow,
    );
    let _runner = tokio::spawn(client.clone().run());

    assert!(
        tokio::time::timeout(std::time::Duration::from_millis(400), inbound.recv())
            .await
            .is_err(),
        "tampered envelope was delivered"
    );
    client.disconnect();
}

#[tokio::test]
async fn reconnects_after_server_drop() {
    // First server drops immediately after registration; a second
    // accept on the same listener must see a fresh registration.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let agent = AgentKeys::generate();

    let server = tokio::spawn(async move {
        for round in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let frame = read_client_frame(&mut ws).await;
            assert!(matches!(frame, ClientFrame::Register { .. }), "round {round}");
            send_server_frame(&mut ws, &ServerFrame::Registered).await;
            if round == 0 {
                drop(ws); // server-side drop forces a reconnect
            } else {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    });

    let (client, _inbound) = RelayClient::new(
        test_config(addr),
        agent,
        PeerRegistry::new(),
        UnknownSenderPolicy::Reject,
    );
    let _runner = tokio::spawn(client.clone().run());

    tokio::time::timeout(std::time::Duration::from_secs(2), server)
        .await
        .expect("second registration never arrived")
        .unwrap();
    client.disconnect();
}
