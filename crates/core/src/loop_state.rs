// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loop state machine vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normal exit.
pub const EXIT_OK: i32 = 0;
/// Fatal error (startup validation failure, unrecoverable orchestrator error).
pub const EXIT_FATAL: i32 = 1;
/// Restart request — a supervisor is expected to rebuild and re-spawn.
pub const EXIT_RESTART: i32 = 75;

/// The orchestrator's primary state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopState {
    Stopped,
    Running,
    Paused,
    RateLimited,
    ShuttingDown,
}

impl LoopState {
    /// Whether injected messages reach a live session in this state.
    ///
    /// Everything else is "effectively paused": messages are queued and
    /// recorded in CONVERSATION with the `[UNPROCESSED]` marker.
    pub fn accepts_input(self) -> bool {
        matches!(self, LoopState::Running)
    }

    /// Whether cycles may run.
    pub fn is_active(self) -> bool {
        matches!(self, LoopState::Running)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Stopped => "STOPPED",
            LoopState::Running => "RUNNING",
            LoopState::Paused => "PAUSED",
            LoopState::RateLimited => "RATE_LIMITED",
            LoopState::ShuttingDown => "SHUTTING_DOWN",
        };
        write!(f, "{}", s)
    }
}

/// Snapshot returned by `GET /api/loop/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopStatus {
    pub state: LoopState,
    #[serde(rename = "rateLimitUntil", skip_serializing_if = "Option::is_none")]
    pub rate_limit_until: Option<String>,
    #[serde(rename = "cycleNumber")]
    pub cycle_number: u64,
}

#[cfg(test)]
#[path = "loop_state_tests.rs"]
mod tests;
