// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The broker.
//!
//! Routing happens synchronously at publish time: the message is pushed
//! onto each matching provider's bounded queue. Worker tasks drain the
//! queues, retrying a failed delivery up to [`DELIVERY_ATTEMPTS`] times
//! before surfacing a `message.error` event. Failures never propagate
//! back to the publisher.

use crate::provider::Provider;
use crate::BusError;
use anima_core::{kinds, BusMessage, Clock};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Total delivery attempts per message per destination.
const DELIVERY_ATTEMPTS: u32 = 3;

/// Backoff between attempts.
const RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Per-provider queue depth.
const QUEUE_DEPTH: usize = 64;

struct Registration {
    provider: Arc<dyn Provider>,
    queue_tx: Option<mpsc::Sender<BusMessage>>,
    worker: Option<JoinHandle<()>>,
}

struct Inner {
    providers: Vec<Registration>,
    started: bool,
}

/// Type-routed in-process broker.
#[derive(Clone)]
pub struct TinyBus<C: Clock> {
    clock: C,
    inner: Arc<Mutex<Inner>>,
    loopback: bool,
}

impl<C: Clock + 'static> TinyBus<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            inner: Arc::new(Mutex::new(Inner {
                providers: Vec::new(),
                started: false,
            })),
            loopback: false,
        }
    }

    /// Deliver messages back to their source provider too.
    pub fn with_loopback(mut self) -> Self {
        self.loopback = true;
        self
    }

    /// Register a provider. Must happen before `start`.
    pub fn register(&self, provider: Arc<dyn Provider>) {
        let mut inner = self.inner.lock();
        debug!(provider = provider.id(), "registered bus provider");
        inner.providers.push(Registration {
            provider,
            queue_tx: None,
            worker: None,
        });
    }

    /// Start every provider and its worker task.
    pub async fn start(&self) -> Result<(), BusError> {
        let providers: Vec<Arc<dyn Provider>> = {
            let inner = self.inner.lock();
            inner.providers.iter().map(|r| Arc::clone(&r.provider)).collect()
        };

        for provider in &providers {
            provider.start().await?;
        }

        let mut inner = self.inner.lock();
        for registration in inner.providers.iter_mut() {
            let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
            let worker = tokio::spawn(run_worker(
                Arc::clone(&registration.provider),
                rx,
                self.clone(),
            ));
            registration.queue_tx = Some(tx);
            registration.worker = Some(worker);
        }
        inner.started = true;
        Ok(())
    }

    /// Publish a message.
    ///
    /// Returns the number of destinations the message was queued for.
    /// Routing failures surface as `message.error` events, never as an
    /// error to the publisher; the only publisher-visible error is
    /// publishing on a bus that was never started.
    pub fn publish(&self, msg: BusMessage) -> Result<usize, BusError> {
        let inner = self.inner.lock();
        if !inner.started {
            return Err(BusError::NotStarted);
        }

        // Exclusive routing by destination
        if let Some(dest) = msg.destination.clone() {
            let registration = inner
                .providers
                .iter()
                .find(|r| r.provider.id() == dest);
            let Some(registration) = registration else {
                drop(inner);
                self.emit_error(&msg, &dest, "unknown destination");
                return Ok(0);
            };
            if !registration.provider.is_ready() {
                drop(inner);
                self.emit_error(&msg, &dest, "provider not ready");
                return Ok(0);
            }
            let queued = enqueue(registration, &msg);
            drop(inner);
            if !queued {
                self.emit_error(&msg, &dest, "queue full");
                return Ok(0);
            }
            return Ok(1);
        }

        // Fan-out by kind
        let mut delivered = 0;
        let mut overflowed: Vec<String> = Vec::new();
        for registration in &inner.providers {
            let provider = &registration.provider;
            if !self.loopback && msg.source.as_deref() == Some(provider.id()) {
                continue;
            }
            if !kind_matches(provider.as_ref(), &msg.kind) || !provider.is_ready() {
                continue;
            }
            if enqueue(registration, &msg) {
                delivered += 1;
            } else {
                overflowed.push(provider.id().to_string());
            }
        }
        drop(inner);

        for dest in overflowed {
            self.emit_error(&msg, &dest, "queue full");
        }
        Ok(delivered)
    }

    /// Stop intake, let workers drain up to `grace`, stop providers.
    pub async fn stop(&self, grace: Duration) {
        let (workers, providers) = {
            let mut inner = self.inner.lock();
            inner.started = false;
            let mut workers = Vec::new();
            let mut providers = Vec::new();
            for registration in inner.providers.iter_mut() {
                // Dropping the sender lets the worker drain and exit
                registration.queue_tx = None;
                if let Some(worker) = registration.worker.take() {
                    workers.push(worker);
                }
                providers.push(Arc::clone(&registration.provider));
            }
            (workers, providers)
        };

        let drain = async {
            for worker in workers {
                let _ = worker.await;
            }
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!("bus drain exceeded grace period");
        }

        for provider in providers {
            provider.stop().await;
        }
    }

    /// Surface a delivery failure as a `message.error` event.
    ///
    /// Error events route only to providers that explicitly subscribe
    /// to [`kinds::ERROR`].
    fn emit_error(&self, original: &BusMessage, destination: &str, reason: &str) {
        error!(
            message = %original.id,
            kind = %original.kind,
            destination,
            reason,
            "bus delivery failed"
        );
        let event = BusMessage::new(
            kinds::ERROR,
            serde_json::json!({
                "messageId": original.id,
                "kind": original.kind,
                "destination": destination,
                "reason": reason,
            }),
            self.clock.epoch_ms(),
        )
        .with_source("bus");

        let inner = self.inner.lock();
        for registration in &inner.providers {
            let provider = &registration.provider;
            if provider.id() == destination {
                continue;
            }
            if provider.kinds().contains(&kinds::ERROR) && provider.is_ready() {
                let _ = enqueue(registration, &event);
            }
        }
    }
}

fn enqueue(registration: &Registration, msg: &BusMessage) -> bool {
    match &registration.queue_tx {
        Some(tx) => tx.try_send(msg.clone()).is_ok(),
        None => false,
    }
}

/// A provider handles a kind when it declares it, or declares nothing.
/// `message.error` needs an explicit subscription either way.
fn kind_matches(provider: &dyn Provider, kind: &str) -> bool {
    let declared = provider.kinds();
    if kind == kinds::ERROR {
        return declared.contains(&kinds::ERROR);
    }
    declared.is_empty() || declared.contains(&kind)
}

/// Drain one provider's queue, retrying failed deliveries.
async fn run_worker<C: Clock + 'static>(
    provider: Arc<dyn Provider>,
    mut rx: mpsc::Receiver<BusMessage>,
    bus: TinyBus<C>,
) {
    while let Some(msg) = rx.recv().await {
        let mut last_err = None;
        for attempt in 1..=DELIVERY_ATTEMPTS {
            match provider.deliver(msg.clone()).await {
                Ok(()) => {
                    last_err = None;
                    break;
                }
                Err(e) => {
                    debug!(
                        provider = provider.id(),
                        attempt,
                        error = %e,
                        "delivery attempt failed"
                    );
                    last_err = Some(e);
                    if attempt < DELIVERY_ATTEMPTS {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }
        if let Some(e) = last_err {
            // Avoid recursing on failed error deliveries
            if msg.kind != kinds::ERROR {
                bus.emit_error(&msg, provider.id(), &e.to_string());
            }
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
