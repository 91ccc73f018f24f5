// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relay state: peer registry, REST sessions, dedup, revocations,
//! rate limiting, and envelope routing.
//!
//! Everything lives behind `parking_lot` mutexes on one shared struct;
//! HTTP and WS handlers go through these operations and never touch the
//! maps directly.

use crate::auth;
use anima_agora::keys::{fingerprint_of, verifying_key_from_hex};
use anima_agora::{AgentKeys, DedupSet, Envelope, ServerFrame};
use anima_core::Clock;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Relay settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub jwt_secret: String,
    pub jwt_expiry_secs: u64,
    pub dedup_capacity: usize,
    pub buffer_capacity: usize,
    pub rate_limit_per_minute: usize,
}

impl RelayConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            jwt_expiry_secs: 3_600,
            dedup_capacity: 10_000,
            buffer_capacity: 100,
            rate_limit_per_minute: 60,
        }
    }
}

/// A live WS peer.
pub struct WsPeer {
    pub last_seen_ms: u64,
    pub tx: mpsc::Sender<ServerFrame>,
    /// Connection nonce so a replaced socket cannot unregister its
    /// successor.
    pub conn_id: u64,
}

/// One message waiting in a REST session's buffer.
#[derive(Debug, Clone, Serialize)]
pub struct BufferedEnvelope {
    pub envelope: Envelope,
    #[serde(rename = "receivedAt")]
    pub received_ms: u64,
}

struct RestSession {
    keys: AgentKeys,
    name: String,
    jti: String,
    expires_at_ms: u64,
    buffer: VecDeque<BufferedEnvelope>,
}

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "privateKey")]
    pub private_key: String,
    pub name: String,
    /// Test envelope co-signed by the client proving key ownership.
    pub envelope: Envelope,
}

/// Registration response body.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub ok: bool,
    pub token: String,
    #[serde(rename = "expiresAt")]
    pub expires_at_ms: u64,
    pub peers: Vec<PeerInfo>,
}

/// One entry of the peer listing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PeerInfo {
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "lastSeen", skip_serializing_if = "Option::is_none")]
    pub last_seen_ms: Option<u64>,
    pub transport: &'static str,
}

/// Where a routed envelope ended up.
#[derive(Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Delivered to a live WS peer.
    Delivered,
    /// Queued in a REST session buffer.
    Buffered,
    /// Duplicate id, dropped before routing.
    Duplicate,
}

/// Shared relay state.
pub struct RelayState<C: Clock> {
    clock: C,
    config: RelayConfig,
    ws_peers: Mutex<HashMap<String, WsPeer>>,
    rest_sessions: Mutex<HashMap<String, RestSession>>,
    dedup: Mutex<DedupSet>,
    /// jti → expiry ms; pruned as entries pass expiry.
    revoked: Mutex<HashMap<String, u64>>,
    rate: Mutex<HashMap<IpAddr, VecDeque<u64>>>,
}

impl<C: Clock> RelayState<C> {
    pub fn new(clock: C, config: RelayConfig) -> Self {
        let dedup_capacity = config.dedup_capacity;
        Self {
            clock,
            config,
            ws_peers: Mutex::new(HashMap::new()),
            rest_sessions: Mutex::new(HashMap::new()),
            dedup: Mutex::new(DedupSet::new(dedup_capacity)),
            revoked: Mutex::new(HashMap::new()),
            rate: Mutex::new(HashMap::new()),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Sliding-window rate limit across all REST endpoints.
    pub fn check_rate(&self, source: IpAddr) -> Result<(), crate::RelayError> {
        let now = self.now_ms();
        let mut rate = self.rate.lock();
        let window = rate.entry(source).or_default();
        while window.front().is_some_and(|&t| now.saturating_sub(t) >= 60_000) {
            window.pop_front();
        }
        if window.len() >= self.config.rate_limit_per_minute {
            return Err(crate::RelayError::RateLimited);
        }
        window.push_back(now);
        Ok(())
    }

    /// Register (or re-register) a REST session.
    ///
    /// Key ownership is proven two ways at once: the presented private
    /// key must derive the presented public key, and the test envelope
    /// must verify against it. Re-registration is last-write-wins; the
    /// previous session's token is revoked.
    pub fn register_rest(
        &self,
        req: RegisterRequest,
    ) -> Result<RegisterResponse, crate::RelayError> {
        let keys = AgentKeys::from_secret_hex(&req.private_key)
            .map_err(|e| crate::RelayError::Invalid(e.to_string()))?;
        if keys.public_key_hex() != req.public_key {
            return Err(crate::RelayError::Invalid(
                "private key does not match public key".to_string(),
            ));
        }
        anima_agora::keys::verify_envelope(&req.envelope, &req.public_key)
            .map_err(|_| crate::RelayError::Invalid("challenge envelope invalid".to_string()))?;

        let now = self.now_ms();
        let issued = auth::issue(
            &self.config.jwt_secret,
            &req.public_key,
            now,
            self.config.jwt_expiry_secs,
        )
        .map_err(|e| crate::RelayError::Invalid(e.to_string()))?;

        let mut sessions = self.rest_sessions.lock();
        if let Some(previous) = sessions.get(&req.public_key) {
            // Last write wins; the old token must stop working now
            self.revoked
                .lock()
                .insert(previous.jti.clone(), previous.expires_at_ms);
        }
        sessions.insert(
            req.public_key.clone(),
            RestSession {
                keys,
                name: req.name,
                jti: issued.jti.clone(),
                expires_at_ms: issued.expires_at_ms,
                buffer: VecDeque::new(),
            },
        );
        drop(sessions);

        info!(public_key = %req.public_key, "rest session registered");
        Ok(RegisterResponse {
            ok: true,
            token: issued.token,
            expires_at_ms: issued.expires_at_ms,
            peers: self.peers_for(&req.public_key),
        })
    }

    /// Authenticate a bearer token. Returns the session's public key.
    pub fn authorize(&self, token: &str) -> Result<String, crate::RelayError> {
        let now = self.now_ms();
        let claims = auth::verify(&self.config.jwt_secret, token, now)?;

        {
            let mut revoked = self.revoked.lock();
            revoked.retain(|_, exp| *exp > now);
            if revoked.contains_key(&claims.jti) {
                return Err(crate::RelayError::Unauthorized);
            }
        }

        let sessions = self.rest_sessions.lock();
        let session = sessions
            .get(&claims.sub)
            .ok_or(crate::RelayError::Unauthorized)?;
        // A newer registration invalidates older tokens
        if session.jti != claims.jti {
            return Err(crate::RelayError::Unauthorized);
        }
        Ok(claims.sub)
    }

    /// Validate an envelope a registered sender is asking us to route.
    ///
    /// The relay never inspects payloads; it checks shape, that the
    /// claimed sender is the connection's own key, and the signature.
    pub fn validate_outbound(
        &self,
        envelope: &Envelope,
        sender_public_key: &str,
    ) -> Result<(), crate::RelayError> {
        envelope
            .validate_shape()
            .map_err(|e| crate::RelayError::Invalid(e.to_string()))?;

        let key = verifying_key_from_hex(sender_public_key)
            .map_err(|e| crate::RelayError::Invalid(e.to_string()))?;
        if envelope.sender != fingerprint_of(&key) {
            return Err(crate::RelayError::Invalid(
                "sender is not the connection's key".to_string(),
            ));
        }
        anima_agora::keys::verify_envelope(envelope, sender_public_key)
            .map_err(|_| crate::RelayError::Invalid("bad signature".to_string()))
    }

    /// Route an envelope to `to`, deduplicating by envelope id.
    pub fn route(&self, to: &str, envelope: Envelope) -> Result<SendOutcome, crate::RelayError> {
        if !self.dedup.lock().insert(&envelope.id) {
            debug!(envelope = %envelope.id, "duplicate envelope dropped");
            return Ok(SendOutcome::Duplicate);
        }

        // Live WS peer first
        let ws_tx = self.ws_peers.lock().get(to).map(|p| p.tx.clone());
        if let Some(tx) = ws_tx {
            return match tx.try_send(ServerFrame::Message { envelope }) {
                Ok(()) => Ok(SendOutcome::Delivered),
                Err(_) => {
                    warn!(to, "ws recipient queue closed or full");
                    Err(crate::RelayError::RecipientGone)
                }
            };
        }

        // REST session buffer
        let now = self.now_ms();
        let mut sessions = self.rest_sessions.lock();
        if let Some(session) = sessions.get_mut(to) {
            if session.buffer.len() == self.config.buffer_capacity {
                session.buffer.pop_front();
            }
            session.buffer.push_back(BufferedEnvelope {
                envelope,
                received_ms: now,
            });
            return Ok(SendOutcome::Buffered);
        }

        Err(crate::RelayError::UnknownRecipient(to.to_string()))
    }

    /// Peer listing for `caller`: union of WS peers and REST sessions,
    /// deduplicated by public key, minus the caller.
    pub fn peers_for(&self, caller: &str) -> Vec<PeerInfo> {
        let mut out: Vec<PeerInfo> = Vec::new();
        {
            let ws = self.ws_peers.lock();
            for (key, peer) in ws.iter() {
                if key != caller {
                    out.push(PeerInfo {
                        public_key: key.clone(),
                        last_seen_ms: Some(peer.last_seen_ms),
                        transport: "ws",
                    });
                }
            }
        }
        {
            let sessions = self.rest_sessions.lock();
            for key in sessions.keys() {
                if key != caller && !out.iter().any(|p| &p.public_key == key) {
                    out.push(PeerInfo {
                        public_key: key.clone(),
                        last_seen_ms: None,
                        transport: "rest",
                    });
                }
            }
        }
        out.sort_by(|a, b| a.public_key.cmp(&b.public_key));
        out
    }

    /// Drain or filter a REST session's buffer.
    ///
    /// Without `since`, up to `limit` messages are returned and removed.
    /// With `since`, matching messages (`timestamp > since`) are
    /// returned and the buffer is left untouched.
    pub fn poll_messages(
        &self,
        public_key: &str,
        since: Option<u64>,
        limit: usize,
    ) -> Result<(Vec<BufferedEnvelope>, bool), crate::RelayError> {
        let limit = limit.clamp(1, self.config.buffer_capacity);
        let mut sessions = self.rest_sessions.lock();
        let session = sessions
            .get_mut(public_key)
            .ok_or(crate::RelayError::Unauthorized)?;

        match since {
            None => {
                let take = limit.min(session.buffer.len());
                let drained: Vec<BufferedEnvelope> =
                    session.buffer.drain(..take).collect();
                let has_more = !session.buffer.is_empty();
                Ok((drained, has_more))
            }
            Some(since) => {
                let matching: Vec<&BufferedEnvelope> = session
                    .buffer
                    .iter()
                    .filter(|b| b.envelope.timestamp > since)
                    .collect();
                let has_more = matching.len() > limit;
                Ok((
                    matching.into_iter().take(limit).cloned().collect(),
                    has_more,
                ))
            }
        }
    }

    /// Revoke the session's token and drop the session.
    pub fn disconnect_rest(&self, public_key: &str) {
        let mut sessions = self.rest_sessions.lock();
        if let Some(session) = sessions.remove(public_key) {
            self.revoked
                .lock()
                .insert(session.jti, session.expires_at_ms);
            info!(public_key, "rest session disconnected");
        }
    }

    /// Sign an envelope on behalf of a REST session (the private key is
    /// held only in memory for this purpose).
    pub fn sign_for_session(
        &self,
        public_key: &str,
        envelope: &mut Envelope,
    ) -> Result<(), crate::RelayError> {
        let sessions = self.rest_sessions.lock();
        let session = sessions
            .get(public_key)
            .ok_or(crate::RelayError::Unauthorized)?;
        session
            .keys
            .sign(envelope)
            .map_err(|e| crate::RelayError::Invalid(e.to_string()))
    }

    /// Human name of a REST session, for logs.
    pub fn session_name(&self, public_key: &str) -> Option<String> {
        self.rest_sessions
            .lock()
            .get(public_key)
            .map(|s| s.name.clone())
    }

    // -- WS peer registry ------------------------------------------------

    /// Register a WS peer. Last write wins for the same key.
    pub fn register_ws(&self, public_key: &str, tx: mpsc::Sender<ServerFrame>, conn_id: u64) {
        let now = self.now_ms();
        self.ws_peers.lock().insert(
            public_key.to_string(),
            WsPeer {
                last_seen_ms: now,
                tx,
                conn_id,
            },
        );
        info!(public_key, conn_id, "ws peer registered");
    }

    /// Remove a WS peer, but only if the registration still belongs to
    /// this connection.
    pub fn unregister_ws(&self, public_key: &str, conn_id: u64) {
        let mut peers = self.ws_peers.lock();
        if peers.get(public_key).is_some_and(|p| p.conn_id == conn_id) {
            peers.remove(public_key);
            info!(public_key, conn_id, "ws peer unregistered");
        }
    }

    /// Record liveness on ping.
    pub fn touch_ws(&self, public_key: &str) {
        let now = self.now_ms();
        if let Some(peer) = self.ws_peers.lock().get_mut(public_key) {
            peer.last_seen_ms = now;
        }
    }

    pub fn ws_peer_count(&self) -> usize {
        self.ws_peers.lock().len()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
