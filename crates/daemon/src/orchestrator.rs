// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The loop orchestrator.
//!
//! One long-running task that drives the cognitive cycle: Ego →
//! Subconscious, a Superego audit every `superego_audit_interval`
//! cycles, and the Id → Superego idle path when the plan has no open
//! tasks. Between cycles it parks on the cycle delay and wakes early
//! for injected messages; pause/stop/rate-limit transitions take
//! effect at the next suspension point.

use crate::control::LoopControl;
use crate::metrics::HealthMetrics;
use crate::roles::{RoleAgents, RoleRun};
use anima_core::{Clock, Config, DocKind, LoopEvent, LoopState, Mode, Role};
use anima_session::ProcessRunner;
use anima_substrate::validate::open_task_count;
use anima_substrate::SubstrateError;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Multiplier applied to the cycle delay once idle sleep kicks in.
const IDLE_SLEEP_FACTOR: u64 = 4;

/// Drives the loop until shutdown.
pub struct Orchestrator<R: ProcessRunner, C: Clock> {
    control: LoopControl,
    agents: RoleAgents<R, C>,
    clock: C,
    config: Config,
    metrics: HealthMetrics,
    /// Round-robin cursor for tick mode.
    tick_cursor: usize,
}

impl<R: ProcessRunner, C: Clock> Orchestrator<R, C> {
    pub fn new(
        control: LoopControl,
        agents: RoleAgents<R, C>,
        clock: C,
        config: Config,
        metrics: HealthMetrics,
    ) -> Self {
        Self {
            control,
            agents,
            clock,
            config,
            metrics,
            tick_cursor: 0,
        }
    }

    /// Run until the state machine reaches SHUTTING_DOWN.
    pub async fn run(mut self) {
        info!(mode = ?self.config.mode, "orchestrator running");
        loop {
            match self.control.state() {
                LoopState::ShuttingDown => break,

                LoopState::Stopped | LoopState::Paused => {
                    self.control.woken().await;
                }

                LoopState::RateLimited => {
                    self.park_for_rate_limit().await;
                }

                LoopState::Running => {
                    match self.config.mode {
                        Mode::Cycle => self.run_cycle().await,
                        Mode::Tick => self.run_tick().await,
                    }
                    if self.control.state() == LoopState::Running {
                        self.inter_cycle_sleep().await;
                    }
                }
            }
        }
        info!("orchestrator stopped");
    }

    /// Sleep until the rate-limit deadline, the wake signal, or a
    /// coarse re-check tick, whichever comes first.
    async fn park_for_rate_limit(&self) {
        let now = self.clock.epoch_ms();
        let Some(until) = self.control.rate_limit_deadline_ms() else {
            self.control.clear_rate_limit(now);
            return;
        };
        if now >= until {
            self.control.clear_rate_limit(now);
            return;
        }

        let wait = Duration::from_millis((until - now).min(1_000));
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = self.control.woken() => {}
        }
    }

    /// One full cycle.
    async fn run_cycle(&mut self) {
        let cycle = self.control.begin_cycle();
        debug!(cycle, "cycle start");

        let open_tasks = match self.read_open_tasks().await {
            Ok(n) => n,
            Err(e) => {
                error!(error = %e, "cannot read plan, skipping cycle");
                return;
            }
        };

        if open_tasks == 0 && self.control.pending_len() == 0 {
            let idle = self.control.note_idle_cycle();
            self.control
                .emit(LoopEvent::idle(self.clock.epoch_ms(), idle));
            if let Err(e) = self.agents.run_idle_path().await {
                warn!(error = %e, "idle path failed");
            }
        } else {
            self.control.reset_idle_cycles();
            if !self.drive_role(Role::Ego).await {
                return;
            }
            if !self.drive_role(Role::Subconscious).await {
                return;
            }
        }

        if self.control.state() == LoopState::Running
            && self.config.superego_audit_interval > 0
            && cycle % self.config.superego_audit_interval == 0
        {
            if let Err(e) = self.agents.run_audit(cycle).await {
                warn!(error = %e, "superego audit failed");
            }
        }

        if let Err(e) = self.agents.conversation.archive_if_needed().await {
            warn!(error = %e, "conversation archiving failed");
        }

        let now = self.clock.epoch_ms();
        self.control.emit(LoopEvent::cycle_complete(now, cycle));
        self.metrics.record(
            now,
            &self.control.status(),
            self.control.consecutive_idle_cycles(),
            self.control.last_activity_ms(),
        );
        debug!(cycle, "cycle complete");
    }

    /// One role per iteration, round-robin Ego → Subconscious.
    async fn run_tick(&mut self) {
        let cycle = self.control.begin_cycle();
        let role = if self.tick_cursor % 2 == 0 {
            Role::Ego
        } else {
            Role::Subconscious
        };
        self.tick_cursor += 1;

        let open_tasks = self.read_open_tasks().await.unwrap_or(0);
        if open_tasks == 0 && self.control.pending_len() == 0 {
            let idle = self.control.note_idle_cycle();
            self.control
                .emit(LoopEvent::idle(self.clock.epoch_ms(), idle));
            if let Err(e) = self.agents.run_idle_path().await {
                warn!(error = %e, "idle path failed");
            }
        } else {
            self.control.reset_idle_cycles();
            self.drive_role(role).await;
        }

        if self.config.superego_audit_interval > 0
            && cycle % self.config.superego_audit_interval == 0
            && self.control.state() == LoopState::Running
        {
            if let Err(e) = self.agents.run_audit(cycle).await {
                warn!(error = %e, "superego audit failed");
            }
        }

        let now = self.clock.epoch_ms();
        self.control.emit(LoopEvent::cycle_complete(now, cycle));
    }

    /// Run one role and absorb its outcome into the state machine.
    /// Returns `false` when the rest of the cycle should be skipped.
    async fn drive_role(&self, role: Role) -> bool {
        if self.control.state() != LoopState::Running {
            return false;
        }
        match self.agents.run_role(role, None).await {
            Ok(run) => self.absorb_rate_limit(&run),
            Err(e) => {
                warn!(%role, error = %e, "role session failed");
                true
            }
        }
    }

    /// A future rate-limit timestamp parks the loop; everything else
    /// lets the cycle continue.
    fn absorb_rate_limit(&self, run: &RoleRun) -> bool {
        let Some(until) = run.rate_limit_until_ms else {
            return true;
        };
        let now = self.clock.epoch_ms();
        if until <= now {
            return true;
        }
        if let Err(e) = self.control.enter_rate_limited(now, until) {
            debug!(error = %e, "rate limit signal ignored");
        }
        false
    }

    async fn read_open_tasks(&self) -> Result<usize, SubstrateError> {
        let plan = self.agents.substrate.read(DocKind::Plan).await?;
        Ok(open_task_count(&plan.text))
    }

    /// Inter-cycle delay; idle sleep stretches it, a wake (injected
    /// message or transition) cuts it short.
    async fn inter_cycle_sleep(&self) {
        let mut delay = self.config.cycle_delay_ms;
        if self.config.idle_sleep.enabled
            && self.control.consecutive_idle_cycles() >= self.config.idle_sleep.idle_cycles_before_sleep
        {
            delay = delay.saturating_mul(IDLE_SLEEP_FACTOR);
        }
        if delay == 0 {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
            _ = self.control.woken() => {
                debug!("inter-cycle sleep interrupted");
            }
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
