// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! anima-relay: the stateless envelope router.
//!
//! Peers connect over WebSocket and are fanned envelopes directly; REST
//! sessions exist for clients that cannot hold a socket and get
//! per-recipient bounded buffers plus JWT-gated polling. Nothing is
//! persisted: registry, buffers, dedup set, and JWT revocations all
//! live in memory and die with the process.

pub mod auth;
pub mod http;
pub mod state;
pub mod ws;

use thiserror::Error;

pub use http::router;
pub use state::{RelayConfig, RelayState};

/// Errors from relay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limited")]
    RateLimited,

    #[error("unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("recipient connection closed")]
    RecipientGone,

    #[error("invalid request: {0}")]
    Invalid(String),
}
