// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end over a live relay: two WS agents, duplicate envelope
//! suppression, and inbound delivery through the peer pump.

use anima_agora::{
    AgentKeys, Envelope, EnvelopeKind, PeerRegistry, RelayClient, RelayClientConfig,
};
use anima_bus::TinyBus;
use anima_core::{
    FakeClock, LoopEventKind, PerSenderRateLimit, SystemClock, UnknownSenderPolicy,
};
use anima_daemon::control::LoopControl;
use anima_daemon::providers::run_peer_inbound;
use anima_relay::{router, RelayConfig, RelayState};
use anima_substrate::{AgoraInbox, Substrate};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const JAN_2026: u64 = 1_767_225_600_000;

async fn start_relay() -> SocketAddr {
    let state = Arc::new(RelayState::new(SystemClock, RelayConfig::new("test-secret")));
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

fn client_config(addr: SocketAddr) -> RelayClientConfig {
    RelayClientConfig {
        url: format!("ws://{addr}/ws"),
        heartbeat_interval_ms: 60_000,
        backoff_initial_ms: 50,
        backoff_cap_ms: 500,
        dedup_capacity: 64,
    }
}

async fn wait_connected(client: &RelayClient) {
    for _ in 0..200 {
        if client.is_connected() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("client never connected");
}

#[tokio::test]
async fn duplicate_envelope_reaches_the_agent_once() {
    let addr = start_relay().await;

    let sender_keys = AgentKeys::generate();
    let receiver_keys = AgentKeys::generate();

    // Receiver knows the sender
    let receiver_peers = PeerRegistry::new();
    receiver_peers.add(sender_keys.fingerprint(), sender_keys.public_key_hex());

    let (receiver, inbound_rx) = RelayClient::new(
        client_config(addr),
        receiver_keys.clone(),
        receiver_peers,
        UnknownSenderPolicy::Reject,
    );
    tokio::spawn(receiver.clone().run());
    wait_connected(&receiver).await;

    let (sender, _sender_rx) = RelayClient::new(
        client_config(addr),
        sender_keys.clone(),
        PeerRegistry::new(),
        UnknownSenderPolicy::Reject,
    );
    tokio::spawn(sender.clone().run());
    wait_connected(&sender).await;

    // Receiver-side daemon wiring: inbox + event stream + bus
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    clock.set_epoch_ms(JAN_2026);
    let substrate = Substrate::new(dir.path(), clock.clone());
    substrate.init().await.unwrap();
    let inbox = AgoraInbox::new(substrate.clone());
    let control = LoopControl::new(JAN_2026);
    let bus = TinyBus::new(clock.clone());
    bus.start().await.unwrap();
    let mut events = control.subscribe();

    tokio::spawn(run_peer_inbound(
        inbound_rx,
        bus,
        inbox.clone(),
        control.clone(),
        clock,
        PerSenderRateLimit {
            enabled: false,
            ..PerSenderRateLimit::default()
        },
    ));

    // The same envelope id twice, 500ms apart
    let mut envelope = Envelope::new(
        EnvelopeKind::Publish,
        sender_keys.fingerprint(),
        JAN_2026,
        serde_json::json!({"text": "hello from afar"}),
    );
    envelope.id = "env-123".to_string();
    sender_keys.sign(&mut envelope).unwrap();

    sender
        .send(&receiver_keys.public_key_hex(), envelope.clone())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    sender
        .send(&receiver_keys.public_key_hex(), envelope)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Exactly one agora_message event
    let mut agora_events = 0;
    while let Ok(event) = events.try_recv() {
        if event.kind == LoopEventKind::AgoraMessage {
            assert_eq!(event.data["envelopeId"], "env-123");
            agora_events += 1;
        }
    }
    assert_eq!(agora_events, 1);

    // And exactly one inbox entry
    let unread = inbox.unread().await.unwrap();
    assert_eq!(unread.len(), 1);
    assert!(unread[0].contains("hello from afar"));

    receiver.disconnect();
    sender.disconnect();
}
