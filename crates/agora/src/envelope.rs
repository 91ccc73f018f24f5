// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The signed envelope.
//!
//! The signature is detached: it covers the canonical JSON encoding of
//! the envelope with the `signature` field removed. Canonical means
//! object keys in sorted order, which is what `serde_json` produces
//! when a struct round-trips through `Value`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Prefix of the webhook wire form.
pub const WEBHOOK_PREFIX: &str = "[AGORA_ENVELOPE]";

/// The closed set of envelope types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Announce,
    Discover,
    Request,
    Response,
    Publish,
    Subscribe,
    Verify,
    Ack,
    Error,
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnvelopeKind::Announce => "announce",
            EnvelopeKind::Discover => "discover",
            EnvelopeKind::Request => "request",
            EnvelopeKind::Response => "response",
            EnvelopeKind::Publish => "publish",
            EnvelopeKind::Subscribe => "subscribe",
            EnvelopeKind::Verify => "verify",
            EnvelopeKind::Ack => "ack",
            EnvelopeKind::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// A peer-to-peer message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique id, UUID-like.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// Sender's public-key fingerprint (lowercase hex).
    pub sender: String,
    /// Milliseconds since epoch.
    pub timestamp: u64,
    pub payload: Value,
    /// Detached signature, lowercase hex. Absent only while building.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(rename = "inReplyTo", skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
}

impl Envelope {
    /// Build an unsigned envelope with a fresh UUID id.
    pub fn new(kind: EnvelopeKind, sender: impl Into<String>, timestamp: u64, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            sender: sender.into(),
            timestamp,
            payload,
            signature: None,
            in_reply_to: None,
        }
    }

    pub fn in_reply_to(mut self, id: impl Into<String>) -> Self {
        self.in_reply_to = Some(id.into());
        self
    }

    /// The canonical bytes the signature covers: this envelope as JSON
    /// with the `signature` field removed and keys sorted.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove("signature");
        }
        serde_json::to_vec(&value)
    }

    /// Webhook wire form: the literal prefix followed by the
    /// base64url-encoded canonical JSON (including the signature).
    pub fn to_webhook_wire(&self) -> Result<String, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        let bytes = serde_json::to_vec(&value)?;
        Ok(format!("{WEBHOOK_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// Parse the webhook wire form back into an envelope.
    pub fn from_webhook_wire(wire: &str) -> Result<Self, crate::AgoraError> {
        let encoded = wire
            .strip_prefix(WEBHOOK_PREFIX)
            .ok_or_else(|| crate::AgoraError::InvalidEnvelope("missing wire prefix".into()))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| crate::AgoraError::InvalidEnvelope(format!("bad base64: {e}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Structural checks independent of signature verification.
    pub fn validate_shape(&self) -> Result<(), crate::AgoraError> {
        if self.id.is_empty() {
            return Err(crate::AgoraError::InvalidEnvelope("empty id".into()));
        }
        if self.sender.is_empty() || !self.sender.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(crate::AgoraError::InvalidEnvelope(
                "sender is not a hex fingerprint".into(),
            ));
        }
        if self.signature.is_none() {
            return Err(crate::AgoraError::InvalidEnvelope("unsigned".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
