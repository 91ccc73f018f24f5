// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! anima-daemon: the host process.
//!
//! Owns the loop orchestrator (Ego → Subconscious → periodic Superego →
//! idle Id), the role agents with their write-set enforcement, the
//! watchdog, the bus providers, and the loop-control HTTP surface.

pub mod api;
pub mod control;
pub mod env;
pub mod metrics;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod roles;
pub mod watchdog;

use anima_core::{DocKind, Role};
use thiserror::Error;

pub use control::LoopControl;
pub use orchestrator::Orchestrator;

/// Errors inside the daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("substrate error: {0}")]
    Substrate(#[from] anima_substrate::SubstrateError),

    #[error("session error: {0}")]
    Session(#[from] anima_session::SessionError),

    #[error("bus error: {0}")]
    Bus(#[from] anima_bus::BusError),

    #[error("{role} may not write {doc}")]
    PermissionDenied { role: Role, doc: DocKind },

    #[error("invalid loop transition: {from} on {event}")]
    InvalidTransition {
        from: anima_core::LoopState,
        event: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
