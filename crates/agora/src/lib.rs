// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! anima-agora: the peer-to-peer protocol layer.
//!
//! Envelopes are detached-signature ed25519 messages identified by the
//! sender's public-key fingerprint. This crate holds the envelope model
//! and canonical signing form, key handling, the client↔relay wire
//! frames, duplicate suppression, and the persistent relay client.

pub mod client;
pub mod dedup;
pub mod envelope;
pub mod keys;
pub mod peers;
pub mod wire;

use thiserror::Error;

pub use client::{InboundMessage, RelayClient, RelayClientConfig};
pub use dedup::DedupSet;
pub use envelope::{Envelope, EnvelopeKind, WEBHOOK_PREFIX};
pub use keys::AgentKeys;
pub use peers::PeerRegistry;
pub use wire::{ClientFrame, ServerFrame};

/// Errors from the agora layer.
#[derive(Debug, Error)]
pub enum AgoraError {
    #[error("not connected")]
    NotConnected,

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("signature verification failed")]
    BadSignature,

    #[error("unknown sender: {0}")]
    UnknownSender(String),

    #[error("invalid key material: {0}")]
    BadKey(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(String),
}
