// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client↔relay WebSocket frames.
//!
//! Every frame is one JSON text message tagged by `type`.

use crate::envelope::Envelope;
use serde::{Deserialize, Serialize};

/// Frames a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Register {
        #[serde(rename = "publicKey")]
        public_key: String,
    },
    Message {
        to: String,
        envelope: Envelope,
    },
    Ping,
}

/// Frames the relay sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Registered,
    Message {
        envelope: Envelope,
    },
    Pong,
    Error {
        message: String,
    },
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
