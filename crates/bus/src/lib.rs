// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! anima-bus: TinyBus, the in-process typed message broker.
//!
//! Providers declare the message kinds they handle; the bus routes each
//! published message either exclusively (by `destination`) or to every
//! matching provider. Each provider gets its own bounded FIFO and worker
//! task, so one slow provider never blocks another and a single provider
//! always sees its messages in publish order.

pub mod bus;
pub mod provider;

use thiserror::Error;

pub use bus::TinyBus;
pub use provider::Provider;

/// Errors from bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus not started")]
    NotStarted,

    #[error("unknown destination: {0}")]
    UnknownDestination(String),

    #[error("provider {0} is not ready")]
    NotReady(String),

    #[error("queue full for provider {0}")]
    QueueFull(String),

    #[error("provider error: {0}")]
    Provider(String),
}
