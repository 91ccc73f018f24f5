// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent relay client.
//!
//! One long-running task owns the WebSocket. On open it registers the
//! agent's public key and starts heartbeating; on close or error it
//! reconnects with exponential backoff (reset by a successful open).
//! Inbound envelopes are deduplicated and signature-checked against the
//! peer registry before they reach the handler channel.

use crate::dedup::DedupSet;
use crate::envelope::Envelope;
use crate::keys::AgentKeys;
use crate::peers::{PeerRegistry, Verification};
use crate::wire::{ClientFrame, ServerFrame};
use crate::AgoraError;
use anima_core::UnknownSenderPolicy;
use futures_util::{SinkExt as _, StreamExt as _};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

/// Client settings.
#[derive(Debug, Clone)]
pub struct RelayClientConfig {
    /// Relay WebSocket URL, e.g. `ws://relay:9100/ws`.
    pub url: String,
    pub heartbeat_interval_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_cap_ms: u64,
    pub dedup_capacity: usize,
}

impl RelayClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat_interval_ms: 30_000,
            backoff_initial_ms: 1_000,
            backoff_cap_ms: 300_000,
            dedup_capacity: 2_048,
        }
    }
}

/// A validated inbound envelope.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub envelope: Envelope,
    /// Signature verified against the claimed sender — via the peer
    /// registry, or via a self-certifying key under the allow policy.
    /// Unverified envelopes must stay inbox-only and never reach the
    /// bus or a live session.
    pub verified: bool,
}

struct ClientState {
    connected: bool,
    should_reconnect: bool,
    backoff_ms: u64,
}

/// Persistent WebSocket client for the relay.
#[derive(Clone)]
pub struct RelayClient {
    config: RelayClientConfig,
    keys: AgentKeys,
    peers: PeerRegistry,
    policy: UnknownSenderPolicy,
    state: Arc<Mutex<ClientState>>,
    out_tx: Arc<Mutex<Option<mpsc::Sender<ClientFrame>>>>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    dedup: Arc<Mutex<DedupSet>>,
}

impl RelayClient {
    /// Build a client. The returned receiver yields validated inbound
    /// messages; drop it and inbound envelopes are discarded.
    pub fn new(
        config: RelayClientConfig,
        keys: AgentKeys,
        peers: PeerRegistry,
        policy: UnknownSenderPolicy,
    ) -> (Self, mpsc::Receiver<InboundMessage>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let backoff = config.backoff_initial_ms;
        let dedup_capacity = config.dedup_capacity;
        (
            Self {
                config,
                keys,
                peers,
                policy,
                state: Arc::new(Mutex::new(ClientState {
                    connected: false,
                    should_reconnect: true,
                    backoff_ms: backoff,
                })),
                out_tx: Arc::new(Mutex::new(None)),
                inbound_tx,
                dedup: Arc::new(Mutex::new(DedupSet::new(dedup_capacity))),
            },
            inbound_rx,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn fingerprint(&self) -> String {
        self.keys.fingerprint()
    }

    /// Queue an envelope for a peer. Fails fast when the socket is
    /// down; the caller decides whether to retry or defer.
    pub fn send(&self, to: &str, envelope: Envelope) -> Result<(), AgoraError> {
        if !self.is_connected() {
            return Err(AgoraError::NotConnected);
        }
        let tx = self.out_tx.lock().clone();
        let Some(tx) = tx else {
            return Err(AgoraError::NotConnected);
        };
        tx.try_send(ClientFrame::Message {
            to: to.to_string(),
            envelope,
        })
        .map_err(|_| AgoraError::NotConnected)
    }

    /// Stop reconnecting and close the current connection.
    pub fn disconnect(&self) {
        let mut state = self.state.lock();
        state.should_reconnect = false;
        state.connected = false;
        drop(state);
        // Dropping the writer side ends the connection task's select
        *self.out_tx.lock() = None;
    }

    fn should_reconnect(&self) -> bool {
        self.state.lock().should_reconnect
    }

    /// Connection supervisor. Runs until [`RelayClient::disconnect`].
    pub async fn run(self) {
        while self.should_reconnect() {
            match tokio_tungstenite::connect_async(self.config.url.as_str()).await {
                Ok((ws, _)) => {
                    info!(url = %self.config.url, "relay connected");
                    // Successful open resets the backoff schedule
                    self.state.lock().backoff_ms = self.config.backoff_initial_ms;
                    self.handle_connection(ws).await;
                    self.state.lock().connected = false;
                    *self.out_tx.lock() = None;
                    info!("relay connection closed");
                }
                Err(e) => {
                    warn!(url = %self.config.url, error = %e, "relay connect failed");
                }
            }

            if !self.should_reconnect() {
                break;
            }
            let delay = {
                let mut state = self.state.lock();
                let delay = state.backoff_ms;
                state.backoff_ms = next_backoff(delay, self.config.backoff_cap_ms);
                delay
            };
            debug!(delay_ms = delay, "scheduling relay reconnect");
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    async fn handle_connection<S>(&self, ws: tokio_tungstenite::WebSocketStream<S>)
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut sink, mut stream) = ws.split();

        let (out_tx, mut out_rx) = mpsc::channel::<ClientFrame>(64);
        *self.out_tx.lock() = Some(out_tx);

        let register = ClientFrame::Register {
            public_key: self.keys.public_key_hex(),
        };
        if send_frame(&mut sink, &register).await.is_err() {
            return;
        }

        let mut heartbeat =
            tokio::time::interval(Duration::from_millis(self.config.heartbeat_interval_ms));
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The immediate first tick would race the register frame
        heartbeat.reset();

        loop {
            tokio::select! {
                frame = stream.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            if !self.handle_server_frame(&text).await {
                                break;
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Err(e)) => {
                            warn!(error = %e, "relay read error");
                            break;
                        }
                        _ => {} // Binary/Ping/Pong at the WS layer: ignore
                    }
                }
                out = out_rx.recv() => {
                    match out {
                        Some(frame) => {
                            if send_frame(&mut sink, &frame).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            // Explicit disconnect
                            let _ = sink.send(WsMessage::Close(None)).await;
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if send_frame(&mut sink, &ClientFrame::Ping).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Returns `false` when the connection should be torn down.
    async fn handle_server_frame(&self, text: &str) -> bool {
        let frame: ServerFrame = match serde_json::from_str(text) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "unparseable relay frame");
                return true;
            }
        };

        match frame {
            ServerFrame::Registered => {
                info!(fingerprint = %self.keys.fingerprint(), "registered with relay");
                self.state.lock().connected = true;
            }
            ServerFrame::Pong => {
                debug!("relay pong");
            }
            ServerFrame::Error { message } => {
                warn!(message, "relay error frame");
            }
            ServerFrame::Message { envelope } => {
                self.handle_inbound(envelope).await;
            }
        }
        true
    }

    async fn handle_inbound(&self, envelope: Envelope) {
        if let Err(e) = envelope.validate_shape() {
            warn!(error = %e, "dropping malformed envelope");
            return;
        }

        let message = match self.peers.verify(&envelope) {
            Verification::Valid => InboundMessage {
                envelope,
                verified: true,
            },
            Verification::Invalid => {
                warn!(
                    envelope = %envelope.id,
                    sender = %envelope.sender,
                    "dropping envelope with bad signature"
                );
                return;
            }
            Verification::Unknown => match self.policy {
                UnknownSenderPolicy::Reject => {
                    debug!(sender = %envelope.sender, "rejecting unknown sender");
                    return;
                }
                // Allow: a self-certifying envelope is still verified
                // against its claimed sender; record the key (trust on
                // first use) and deliver like any known peer.
                UnknownSenderPolicy::Allow => {
                    match crate::keys::self_certified_key(&envelope) {
                        Some(key) => {
                            info!(sender = %envelope.sender, "learned peer from self-certified envelope");
                            self.peers.add(envelope.sender.clone(), key);
                            InboundMessage {
                                envelope,
                                verified: true,
                            }
                        }
                        None => InboundMessage {
                            envelope,
                            verified: false,
                        },
                    }
                }
                UnknownSenderPolicy::Quarantine => InboundMessage {
                    envelope,
                    verified: false,
                },
            },
        };

        // Dedup after verification so a forged envelope cannot burn a
        // genuine id
        if !self.dedup.lock().insert(&message.envelope.id) {
            debug!(envelope = %message.envelope.id, "dropping duplicate envelope");
            return;
        }

        if self.inbound_tx.send(message).await.is_err() {
            debug!("inbound handler dropped, discarding envelope");
        }
    }
}

async fn send_frame<S>(
    sink: &mut futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<S>,
        WsMessage,
    >,
    frame: &ClientFrame,
) -> Result<(), AgoraError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let text = serde_json::to_string(frame)?;
    sink.send(WsMessage::Text(text.into()))
        .await
        .map_err(|e| AgoraError::WebSocket(e.to_string()))
}

/// Double the delay up to the cap.
pub(crate) fn next_backoff(current_ms: u64, cap_ms: u64) -> u64 {
    current_ms.saturating_mul(2).min(cap_ms)
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
