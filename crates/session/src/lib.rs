// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! anima-session: One external reasoning subprocess at a time.
//!
//! The launcher spawns the configured reasoning command with stdin
//! closed, streams its stdout line-by-line into typed events, supports
//! mid-flight text injection through a side channel, and enforces
//! wall-clock budgets with a SIGTERM → grace → SIGKILL escalation.

pub mod launcher;
pub mod parser;
pub mod runner;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeProcessRunner, FakeScript, RecordedSignal};

use thiserror::Error;

pub use launcher::{
    read_injected_lines, LauncherConfig, RunningSession, SessionControl, SessionLauncher,
    SessionOutcome,
};
pub use parser::{parse_line, SessionEvent};
pub use runner::{ProcessRunner, Sig, SpawnSpec, SpawnedProcess, TokioProcessRunner};

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("a session is already active: {0}")]
    Busy(anima_core::id::SessionId),

    #[error("signal failed: {0}")]
    SignalFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
