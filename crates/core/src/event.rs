// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loop events broadcast to UI clients over `/ws`.
//!
//! Wire form is `{"type": "...", "timestamp": <ms>, "data": {...}}`.

use crate::loop_state::LoopState;
use crate::role::Role;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event discriminator, serialized as the wire `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopEventKind {
    StateChanged,
    CycleComplete,
    TickComplete,
    Idle,
    ProcessOutput,
    ConversationResponse,
    AgoraMessage,
}

impl fmt::Display for LoopEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopEventKind::StateChanged => "state_changed",
            LoopEventKind::CycleComplete => "cycle_complete",
            LoopEventKind::TickComplete => "tick_complete",
            LoopEventKind::Idle => "idle",
            LoopEventKind::ProcessOutput => "process_output",
            LoopEventKind::ConversationResponse => "conversation_response",
            LoopEventKind::AgoraMessage => "agora_message",
        };
        write!(f, "{}", s)
    }
}

/// One event on the UI stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopEvent {
    #[serde(rename = "type")]
    pub kind: LoopEventKind,
    pub timestamp: u64,
    pub data: serde_json::Value,
}

impl LoopEvent {
    pub fn state_changed(ts: u64, state: LoopState) -> Self {
        Self {
            kind: LoopEventKind::StateChanged,
            timestamp: ts,
            data: serde_json::json!({ "state": state }),
        }
    }

    pub fn cycle_complete(ts: u64, cycle_number: u64) -> Self {
        Self {
            kind: LoopEventKind::CycleComplete,
            timestamp: ts,
            data: serde_json::json!({ "cycleNumber": cycle_number }),
        }
    }

    pub fn tick_complete(ts: u64, role: Role, timed_out: bool) -> Self {
        Self {
            kind: LoopEventKind::TickComplete,
            timestamp: ts,
            data: serde_json::json!({ "role": role, "timed_out": timed_out }),
        }
    }

    pub fn idle(ts: u64, consecutive_idle_cycles: u64) -> Self {
        Self {
            kind: LoopEventKind::Idle,
            timestamp: ts,
            data: serde_json::json!({ "consecutiveIdleCycles": consecutive_idle_cycles }),
        }
    }

    pub fn process_output(ts: u64, role: Role, chunk: &str) -> Self {
        Self {
            kind: LoopEventKind::ProcessOutput,
            timestamp: ts,
            data: serde_json::json!({ "role": role, "chunk": chunk }),
        }
    }

    pub fn conversation_response(ts: u64, text: &str) -> Self {
        Self {
            kind: LoopEventKind::ConversationResponse,
            timestamp: ts,
            data: serde_json::json!({ "text": text }),
        }
    }

    pub fn agora_message(ts: u64, envelope_id: &str, sender: &str) -> Self {
        Self {
            kind: LoopEventKind::AgoraMessage,
            timestamp: ts,
            data: serde_json::json!({ "envelopeId": envelope_id, "sender": sender }),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
