// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus message model.
//!
//! Messages are routed by dotted `kind` namespace, or exclusively by
//! `destination` when one is set. The payload stays opaque JSON; typed
//! decoding happens at the receiving provider.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a bus message.
    pub struct MessageId;
}

/// Current bus message schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Well-known message kinds.
pub mod kinds {
    /// A human message from the UI.
    pub const USER_MESSAGE: &str = "user.message";
    /// A verified inbound peer envelope.
    pub const AGORA_IN: &str = "agora.envelope.in";
    /// An envelope the agent wants relayed to a peer.
    pub const AGORA_OUT: &str = "agora.envelope.out";
    /// A line destined for the conversation file.
    pub const CONVERSATION_APPEND: &str = "conversation.append";
    /// Delivery failure surfaced by the bus itself.
    pub const ERROR: &str = "message.error";
}

/// A typed message travelling over the in-process bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    pub id: MessageId,
    /// Dotted namespace, e.g. `user.message`.
    pub kind: String,
    pub schema_version: u32,
    pub timestamp_ms: u64,
    /// Provider id that published the message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Exclusive-routing target provider id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl BusMessage {
    /// Create a message with a fresh UUID id.
    pub fn new(kind: impl Into<String>, payload: serde_json::Value, timestamp_ms: u64) -> Self {
        Self {
            id: MessageId::new(uuid::Uuid::new_v4().to_string()),
            kind: kind.into(),
            schema_version: SCHEMA_VERSION,
            timestamp_ms,
            source: None,
            destination: None,
            payload: Some(payload),
            meta: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Payload `text` field, the common case for user/peer messages.
    pub fn text(&self) -> Option<&str> {
        self.payload.as_ref()?.get("text")?.as_str()
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
