// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider contract.

use crate::BusError;
use anima_core::BusMessage;
use async_trait::async_trait;

/// A transport adapter registered with the bus.
///
/// `kinds()` declares which message kinds the provider handles; an
/// empty set means "all kinds" (with one exception: `message.error`
/// events require an explicit subscription so a failing catch-all
/// provider cannot feed itself an error loop).
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Stable provider id; also the `destination` routing key.
    fn id(&self) -> &str;

    /// Handled message kinds. Empty means all.
    fn kinds(&self) -> &[&str];

    /// Bring the transport up. Called once by the bus.
    async fn start(&self) -> Result<(), BusError> {
        Ok(())
    }

    /// Tear the transport down. Called once by the bus.
    async fn stop(&self) {}

    /// Whether the provider can accept messages right now.
    fn is_ready(&self) -> bool {
        true
    }

    /// Handle one message. Serial per provider: the bus never calls
    /// this concurrently for the same provider.
    async fn deliver(&self, msg: BusMessage) -> Result<(), BusError>;
}
