// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Known peer registry: fingerprint → public key.

use crate::keys::verify_envelope;
use crate::Envelope;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of checking an inbound envelope against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Known sender, valid signature.
    Valid,
    /// Known sender, signature did not verify.
    Invalid,
    /// Sender not in the registry.
    Unknown,
}

/// Thread-safe peer registry.
#[derive(Clone, Default)]
pub struct PeerRegistry {
    peers: Arc<RwLock<HashMap<String, String>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer's public key under its fingerprint. Last write
    /// wins on re-registration.
    pub fn add(&self, fingerprint: impl Into<String>, public_key_hex: impl Into<String>) {
        self.peers
            .write()
            .insert(fingerprint.into(), public_key_hex.into());
    }

    pub fn public_key(&self, fingerprint: &str) -> Option<String> {
        self.peers.read().get(fingerprint).cloned()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.peers.read().contains_key(fingerprint)
    }

    pub fn fingerprints(&self) -> Vec<String> {
        self.peers.read().keys().cloned().collect()
    }

    /// Verify an envelope against its claimed sender's registered key.
    pub fn verify(&self, envelope: &Envelope) -> Verification {
        let Some(key) = self.public_key(&envelope.sender) else {
            return Verification::Unknown;
        };
        match verify_envelope(envelope, &key) {
            Ok(()) => Verification::Valid,
            Err(_) => Verification::Invalid,
        }
    }
}

#[cfg(test)]
#[path = "peers_tests.rs"]
mod tests;
