// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared loop-control state.
//!
//! The orchestrator exclusively owns the loop state machine, but the
//! API surface, watchdog, and bus providers all need to observe it and
//! request transitions. `LoopControl` is the single authority they go
//! through; "effective pause" in particular is computed here and
//! nowhere else.

use crate::DaemonError;
use anima_core::{LoopEvent, LoopState, LoopStatus};
use anima_session::SessionControl;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, warn};

/// Cap on messages queued for the next Ego prompt.
const PENDING_CAP: usize = 256;

struct Shared {
    state: LoopState,
    cycle_number: u64,
    consecutive_idle_cycles: u64,
    rate_limit_until_ms: Option<u64>,
    last_activity_ms: u64,
    pending: VecDeque<String>,
    session: Option<SessionControl>,
}

/// Clonable handle over the loop's shared state.
#[derive(Clone)]
pub struct LoopControl {
    shared: Arc<Mutex<Shared>>,
    wake: Arc<Notify>,
    events: broadcast::Sender<LoopEvent>,
}

impl LoopControl {
    pub fn new(now_ms: u64) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state: LoopState::Stopped,
                cycle_number: 0,
                consecutive_idle_cycles: 0,
                rate_limit_until_ms: None,
                last_activity_ms: now_ms,
                pending: VecDeque::new(),
                session: None,
            })),
            wake: Arc::new(Notify::new()),
            events,
        }
    }

    // -- observation -----------------------------------------------------

    pub fn state(&self) -> LoopState {
        self.shared.lock().state
    }

    pub fn status(&self) -> LoopStatus {
        let shared = self.shared.lock();
        LoopStatus {
            state: shared.state,
            rate_limit_until: shared.rate_limit_until_ms.map(anima_core::iso_ts),
            cycle_number: shared.cycle_number,
        }
    }

    /// Anything but RUNNING is effectively paused: injected messages
    /// are queued and recorded as `[UNPROCESSED]`.
    pub fn effectively_paused(&self) -> bool {
        self.shared.lock().state != LoopState::Running
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.shared.lock().last_activity_ms
    }

    pub fn consecutive_idle_cycles(&self) -> u64 {
        self.shared.lock().consecutive_idle_cycles
    }

    pub fn rate_limit_deadline_ms(&self) -> Option<u64> {
        self.shared.lock().rate_limit_until_ms
    }

    /// UI event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<LoopEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: LoopEvent) {
        let _ = self.events.send(event);
    }

    /// Future the orchestrator parks on between cycles; completes on
    /// any control transition or injected message.
    pub async fn woken(&self) {
        self.wake.notified().await;
    }

    // -- transitions -----------------------------------------------------

    pub fn start(&self, now_ms: u64) -> Result<LoopStatus, DaemonError> {
        self.transition(now_ms, "start", |state| match state {
            LoopState::Stopped | LoopState::RateLimited | LoopState::Paused => {
                Some(LoopState::Running)
            }
            LoopState::Running => Some(LoopState::Running),
            _ => None,
        })
    }

    pub fn pause(&self, now_ms: u64) -> Result<LoopStatus, DaemonError> {
        let status = self.transition(now_ms, "pause", |state| match state {
            LoopState::Running => Some(LoopState::Paused),
            LoopState::Paused => Some(LoopState::Paused),
            _ => None,
        })?;
        self.cancel_session();
        Ok(status)
    }

    pub fn resume(&self, now_ms: u64) -> Result<LoopStatus, DaemonError> {
        self.transition(now_ms, "resume", |state| match state {
            LoopState::Paused => Some(LoopState::Running),
            LoopState::Running => Some(LoopState::Running),
            _ => None,
        })
    }

    pub fn stop(&self, now_ms: u64) -> Result<LoopStatus, DaemonError> {
        let status = self.transition(now_ms, "stop", |_| Some(LoopState::Stopped))?;
        self.cancel_session();
        self.shared.lock().rate_limit_until_ms = None;
        Ok(status)
    }

    pub fn restart(&self, now_ms: u64) -> Result<LoopStatus, DaemonError> {
        self.stop(now_ms)?;
        {
            let mut shared = self.shared.lock();
            shared.consecutive_idle_cycles = 0;
        }
        self.start(now_ms)
    }

    pub fn shutdown(&self, now_ms: u64) -> LoopStatus {
        let status = self
            .transition(now_ms, "shutdown", |_| Some(LoopState::ShuttingDown))
            .unwrap_or_else(|_| self.status());
        self.cancel_session();
        status
    }

    /// Park the loop until `until_ms`.
    pub fn enter_rate_limited(&self, now_ms: u64, until_ms: u64) -> Result<(), DaemonError> {
        {
            let mut shared = self.shared.lock();
            if shared.state != LoopState::Running {
                return Err(DaemonError::InvalidTransition {
                    from: shared.state,
                    event: "rate-limit",
                });
            }
            shared.state = LoopState::RateLimited;
            shared.rate_limit_until_ms = Some(until_ms);
        }
        info!(until = %anima_core::iso_ts(until_ms), "loop rate limited");
        self.emit(LoopEvent::state_changed(now_ms, LoopState::RateLimited));
        self.wake.notify_one();
        Ok(())
    }

    /// Called when the rate-limit deadline passes.
    pub fn clear_rate_limit(&self, now_ms: u64) {
        {
            let mut shared = self.shared.lock();
            if shared.state != LoopState::RateLimited {
                return;
            }
            shared.state = LoopState::Running;
            shared.rate_limit_until_ms = None;
        }
        info!("rate limit cleared");
        self.emit(LoopEvent::state_changed(now_ms, LoopState::Running));
        self.wake.notify_one();
    }

    fn transition(
        &self,
        now_ms: u64,
        event: &'static str,
        next: impl FnOnce(LoopState) -> Option<LoopState>,
    ) -> Result<LoopStatus, DaemonError> {
        let (from, to) = {
            let mut shared = self.shared.lock();
            let from = shared.state;
            let Some(to) = next(from) else {
                return Err(DaemonError::InvalidTransition { from, event });
            };
            shared.state = to;
            if to == LoopState::Running {
                shared.rate_limit_until_ms = None;
                shared.last_activity_ms = now_ms;
            }
            (from, to)
        };

        if from != to {
            info!(%from, %to, event, "loop state changed");
            self.emit(LoopEvent::state_changed(now_ms, to));
        }
        self.wake.notify_one();
        Ok(self.status())
    }

    // -- session + activity ---------------------------------------------

    pub fn register_session(&self, session: SessionControl) {
        self.shared.lock().session = Some(session);
    }

    pub fn has_active_session(&self) -> bool {
        self.shared.lock().session.is_some()
    }

    pub fn clear_session(&self) {
        self.shared.lock().session = None;
    }

    fn cancel_session(&self) {
        let session = self.shared.lock().session.clone();
        if let Some(session) = session {
            debug!(session = %session.id(), "cancelling active session");
            session.cancel();
        }
    }

    pub fn mark_activity(&self, now_ms: u64) {
        self.shared.lock().last_activity_ms = now_ms;
    }

    // -- message injection ----------------------------------------------

    /// Deliver a message to the live session, or queue it for the next
    /// Ego prompt. Returns `true` only on live delivery.
    pub fn inject_message(&self, now_ms: u64, text: &str) -> bool {
        let (state, session) = {
            let shared = self.shared.lock();
            (shared.state, shared.session.clone())
        };

        if state == LoopState::Running {
            if let Some(session) = session {
                if session.inject(text) {
                    self.mark_activity(now_ms);
                    return true;
                }
            }
        }

        let mut shared = self.shared.lock();
        if shared.pending.len() == PENDING_CAP {
            warn!("pending message queue full, dropping oldest");
            shared.pending.pop_front();
        }
        shared.pending.push_back(text.to_string());
        drop(shared);
        self.wake.notify_one();
        false
    }

    /// Take every queued message, oldest first.
    pub fn drain_pending(&self) -> Vec<String> {
        self.shared.lock().pending.drain(..).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    // -- cycle bookkeeping ----------------------------------------------

    /// Increment and return the cycle number.
    pub fn begin_cycle(&self) -> u64 {
        let mut shared = self.shared.lock();
        shared.cycle_number += 1;
        shared.cycle_number
    }

    pub fn note_idle_cycle(&self) -> u64 {
        let mut shared = self.shared.lock();
        shared.consecutive_idle_cycles += 1;
        shared.consecutive_idle_cycles
    }

    pub fn reset_idle_cycles(&self) {
        self.shared.lock().consecutive_idle_cycles = 0;
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
