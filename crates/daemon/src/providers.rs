// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus providers binding the transports together.
//!
//! Four adapters: session injection (messages into the live session),
//! conversation-on-pause (recording messages, `[UNPROCESSED]` when the
//! loop is effectively paused), peer outbound (bus → relay client),
//! and the peer inbound pump (relay client → inbox + bus + UI event).
//! The pause authority is the orchestrator's `LoopControl`; providers
//! only query it.

use crate::control::LoopControl;
use anima_agora::{InboundMessage, RelayClient};
use anima_bus::{BusError, Provider, TinyBus};
use anima_core::{kinds, BusMessage, Clock, LoopEvent, PerSenderRateLimit};
use anima_substrate::{AgoraInbox, ConversationLog, InboxEntry};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Extract the display text of a user/peer bus message.
fn message_text(msg: &BusMessage) -> Option<String> {
    if let Some(text) = msg.text() {
        return Some(text.to_string());
    }
    // Peer envelopes carry their payload under "envelope"
    let envelope = msg.payload.as_ref()?.get("envelope")?;
    envelope
        .get("payload")
        .and_then(|p| p.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| Some(envelope.get("payload")?.to_string()))
}

// -- session injection ---------------------------------------------------

/// Forwards user and verified peer messages into the live session.
pub struct SessionInjectionProvider<C: Clock> {
    control: LoopControl,
    clock: C,
}

impl<C: Clock> SessionInjectionProvider<C> {
    pub const ID: &'static str = "session-injection";

    pub fn new(control: LoopControl, clock: C) -> Self {
        Self { control, clock }
    }
}

#[async_trait]
impl<C: Clock + 'static> Provider for SessionInjectionProvider<C> {
    fn id(&self) -> &str {
        Self::ID
    }

    fn kinds(&self) -> &[&str] {
        &[kinds::USER_MESSAGE, kinds::AGORA_IN]
    }

    async fn deliver(&self, msg: BusMessage) -> Result<(), BusError> {
        let Some(text) = message_text(&msg) else {
            return Ok(());
        };
        // false means queued for the next Ego prompt, which is success
        // from the bus's point of view
        let delivered = self.control.inject_message(self.clock.epoch_ms(), &text);
        debug!(message = %msg.id, delivered, "message routed toward session");
        Ok(())
    }
}

// -- conversation-on-pause ----------------------------------------------

/// Records every user/peer message in CONVERSATION, marking it
/// `[UNPROCESSED]` while the loop is effectively paused.
pub struct ConversationOnPauseProvider<C: Clock> {
    control: LoopControl,
    conversation: ConversationLog<C>,
}

impl<C: Clock> ConversationOnPauseProvider<C> {
    pub const ID: &'static str = "conversation-on-pause";

    pub fn new(control: LoopControl, conversation: ConversationLog<C>) -> Self {
        Self {
            control,
            conversation,
        }
    }
}

#[async_trait]
impl<C: Clock + 'static> Provider for ConversationOnPauseProvider<C> {
    fn id(&self) -> &str {
        Self::ID
    }

    fn kinds(&self) -> &[&str] {
        &[kinds::USER_MESSAGE, kinds::AGORA_IN]
    }

    async fn deliver(&self, msg: BusMessage) -> Result<(), BusError> {
        let Some(text) = message_text(&msg) else {
            return Ok(());
        };
        let label = if msg.kind == kinds::USER_MESSAGE {
            "USER"
        } else {
            "PEER"
        };
        let unprocessed = self.control.effectively_paused();
        self.conversation
            .append(label, &text, unprocessed)
            .await
            .map_err(|e| BusError::Provider(e.to_string()))?;
        Ok(())
    }
}

// -- peer outbound -------------------------------------------------------

/// Sends `agora.envelope.out` messages through the relay client.
pub struct PeerOutboundProvider {
    client: RelayClient,
}

impl PeerOutboundProvider {
    pub const ID: &'static str = "peer-outbound";

    pub fn new(client: RelayClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Provider for PeerOutboundProvider {
    fn id(&self) -> &str {
        Self::ID
    }

    fn kinds(&self) -> &[&str] {
        &[kinds::AGORA_OUT]
    }

    async fn deliver(&self, msg: BusMessage) -> Result<(), BusError> {
        let payload = msg
            .payload
            .as_ref()
            .ok_or_else(|| BusError::Provider("missing payload".to_string()))?;
        let to = payload
            .get("to")
            .and_then(Value::as_str)
            .ok_or_else(|| BusError::Provider("missing to".to_string()))?;
        let envelope = payload
            .get("envelope")
            .cloned()
            .ok_or_else(|| BusError::Provider("missing envelope".to_string()))?;
        let envelope = serde_json::from_value(envelope)
            .map_err(|e| BusError::Provider(format!("bad envelope: {e}")))?;

        // NotConnected bubbles as a delivery failure so the bus retries
        // and then surfaces a message.error event
        self.client
            .send(to, envelope)
            .map_err(|e| BusError::Provider(e.to_string()))
    }
}

// -- peer inbound pump ---------------------------------------------------

/// Long-running task draining the relay client's inbound channel.
///
/// Every admitted envelope lands in the Agora inbox and emits an
/// `agora_message` UI event; only signature-verified envelopes are
/// published onto the bus.
pub async fn run_peer_inbound<C: Clock>(
    mut rx: mpsc::Receiver<InboundMessage>,
    bus: TinyBus<C>,
    inbox: AgoraInbox<C>,
    control: LoopControl,
    clock: C,
    limit: PerSenderRateLimit,
) {
    let mut windows: HashMap<String, VecDeque<u64>> = HashMap::new();

    while let Some(inbound) = rx.recv().await {
        let now = clock.epoch_ms();
        let envelope = &inbound.envelope;

        if limit.enabled {
            let window = windows.entry(envelope.sender.clone()).or_default();
            while window
                .front()
                .is_some_and(|&t| now.saturating_sub(t) >= limit.window_ms)
            {
                window.pop_front();
            }
            if window.len() >= limit.max_messages as usize {
                warn!(sender = %envelope.sender, "per-sender rate limit, dropping envelope");
                continue;
            }
            window.push_back(now);
        }

        let text = envelope
            .payload
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| envelope.payload.to_string());
        let entry_text = if inbound.verified {
            text.clone()
        } else {
            format!("[unverified] {text}")
        };

        let added = inbox
            .add_unread(&InboxEntry {
                envelope_id: envelope.id.clone(),
                sender: envelope.sender.clone(),
                timestamp_ms: envelope.timestamp,
                text: entry_text,
            })
            .await;
        match added {
            Ok(true) => {}
            Ok(false) => {
                debug!(envelope = %envelope.id, "already in inbox, skipping");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "inbox write failed");
                continue;
            }
        }

        control.emit(LoopEvent::agora_message(now, &envelope.id, &envelope.sender));

        // Only signature-verified envelopes reach the bus (and from
        // there, a session)
        if inbound.verified {
            let msg = BusMessage::new(
                kinds::AGORA_IN,
                serde_json::json!({ "envelope": envelope }),
                now,
            )
            .with_source("peer-inbound")
            .with_meta(serde_json::json!({ "verified": true }));
            if let Err(e) = bus.publish(msg) {
                warn!(error = %e, "bus publish of inbound envelope failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "providers_tests.rs"]
mod tests;
