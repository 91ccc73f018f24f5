// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stall watchdog.
//!
//! Observes `last_activity` on its own timer and never shares a lock
//! with the orchestrator beyond that read. A stalled loop first gets a
//! reminder injected (which itself counts as activity, so the
//! force-restart clock starts over once); if inactivity persists past
//! the force threshold, the watchdog asks the host to exit with the
//! restart code so a supervisor can rebuild and re-spawn.

use crate::control::LoopControl;
use anima_core::{Clock, LoopState, WatchdogConfig};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Text injected when the loop looks stalled.
pub const STALL_REMINDER: &str =
    "No activity for a while. Summarize where you are and take the next smallest step.";

pub struct Watchdog<C: Clock> {
    control: LoopControl,
    config: WatchdogConfig,
    clock: C,
}

impl<C: Clock> Watchdog<C> {
    pub fn new(control: LoopControl, config: WatchdogConfig, clock: C) -> Self {
        Self {
            control,
            config,
            clock,
        }
    }

    /// Run until a force-restart fires (sends on `restart_tx`) or the
    /// loop shuts down.
    pub async fn run(self, restart_tx: mpsc::Sender<()>) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.check_interval_ms.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // A reminder is sent once per stall episode: again only after
        // genuine activity has moved last_activity past it.
        let mut reminded_at: Option<u64> = None;

        loop {
            interval.tick().await;

            match self.control.state() {
                LoopState::ShuttingDown => return,
                LoopState::Running => {}
                _ => {
                    reminded_at = None;
                    continue;
                }
            }

            let now = self.clock.epoch_ms();
            let last_activity = self.control.last_activity_ms();
            let inactive = now.saturating_sub(last_activity);

            if inactive >= self.config.force_restart_threshold_ms {
                warn!(
                    inactive_ms = inactive,
                    "loop stalled past force threshold, requesting restart"
                );
                let _ = restart_tx.send(()).await;
                return;
            }

            if inactive >= self.config.stall_threshold_ms
                && reminded_at.is_none_or(|r| last_activity > r)
            {
                info!(inactive_ms = inactive, "loop stalled, injecting reminder");
                self.control.inject_message(now, STALL_REMINDER);
                reminded_at = Some(now);
            }
        }
    }
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
