// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key handling: ed25519 signing keys, fingerprints, envelope
//! signing and verification.

use crate::envelope::Envelope;
use crate::AgoraError;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use sha2::{Digest, Sha256};

/// An agent's ed25519 keypair.
#[derive(Clone)]
pub struct AgentKeys {
    signing: SigningKey,
}

impl AgentKeys {
    /// Generate a fresh keypair.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self {
            signing: SigningKey::generate(&mut rng),
        }
    }

    /// Restore from a 32-byte secret in hex.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, AgoraError> {
        let bytes = hex::decode(secret_hex).map_err(|e| AgoraError::BadKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AgoraError::BadKey("secret must be 32 bytes".into()))?;
        Ok(Self {
            signing: SigningKey::from_bytes(&bytes),
        })
    }

    /// The secret key as hex, for at-rest storage by the caller.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing.to_bytes())
    }

    /// The public (verifying) key as hex.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing.verifying_key().to_bytes())
    }

    /// Public-key fingerprint: lowercase hex SHA-256 of the verifying
    /// key bytes. This is the `sender` field of every envelope.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(&self.signing.verifying_key())
    }

    /// Sign an envelope in place over its canonical bytes.
    pub fn sign(&self, envelope: &mut Envelope) -> Result<(), AgoraError> {
        envelope.signature = None;
        let bytes = envelope.signing_bytes()?;
        let signature = self.signing.sign(&bytes);
        envelope.signature = Some(hex::encode(signature.to_bytes()));
        Ok(())
    }
}

impl std::fmt::Debug for AgentKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secret material
        f.debug_struct("AgentKeys")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Fingerprint of a verifying key.
pub fn fingerprint_of(key: &VerifyingKey) -> String {
    hex::encode(Sha256::digest(key.to_bytes()))
}

/// Parse a hex-encoded verifying key.
pub fn verifying_key_from_hex(public_key_hex: &str) -> Result<VerifyingKey, AgoraError> {
    let bytes = hex::decode(public_key_hex).map_err(|e| AgoraError::BadKey(e.to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AgoraError::BadKey("public key must be 32 bytes".into()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| AgoraError::BadKey(e.to_string()))
}

/// Attempt self-certification of an envelope from an unregistered
/// sender.
///
/// Announce-style envelopes carry the sender's public key in their
/// payload (`publicKey`, hex). When that key's fingerprint equals the
/// claimed `sender` and the detached signature verifies against it,
/// the envelope is as verified as one from a registered peer; the key
/// is returned so the caller can record it (trust on first use).
pub fn self_certified_key(envelope: &Envelope) -> Option<String> {
    let key_hex = envelope.payload.get("publicKey")?.as_str()?;
    let key = verifying_key_from_hex(key_hex).ok()?;
    if fingerprint_of(&key) != envelope.sender {
        return None;
    }
    verify_envelope(envelope, key_hex).ok()?;
    Some(key_hex.to_string())
}

/// Verify an envelope's detached signature against a public key, and
/// that the claimed sender is that key's fingerprint.
pub fn verify_envelope(envelope: &Envelope, public_key_hex: &str) -> Result<(), AgoraError> {
    let key = verifying_key_from_hex(public_key_hex)?;
    if envelope.sender != fingerprint_of(&key) {
        return Err(AgoraError::BadSignature);
    }

    let signature_hex = envelope
        .signature
        .as_deref()
        .ok_or_else(|| AgoraError::InvalidEnvelope("unsigned".into()))?;
    let signature_bytes =
        hex::decode(signature_hex).map_err(|_| AgoraError::BadSignature)?;
    let signature_bytes: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| AgoraError::BadSignature)?;
    let signature = Signature::from_bytes(&signature_bytes);

    let mut unsigned = envelope.clone();
    unsigned.signature = None;
    let bytes = unsigned.signing_bytes()?;
    key.verify(&bytes, &signature)
        .map_err(|_| AgoraError::BadSignature)
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
