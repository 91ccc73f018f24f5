// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session launcher.
//!
//! One session at a time per host process. The launcher spawns the
//! reasoning command, streams parsed events to the observer channel,
//! and enforces the wall-clock budget. Cancellation and timeout both
//! run the same escalation: SIGTERM, wait the grace period, SIGKILL.

use crate::parser::{parse_line, SessionEvent};
use crate::runner::{ProcessRunner, Sig, SpawnSpec, SpawnedProcess};
use crate::SessionError;
use anima_core::id::SessionId;
use anima_core::{Clock, Role};
use parking_lot::Mutex;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, info, warn};

/// Launcher settings.
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// The reasoning command to spawn.
    pub command: String,
    /// Working directory for sessions; the injection side channel lives
    /// under `<working_dir>/.session/`.
    pub working_dir: PathBuf,
    /// Wall-clock cap for any session. The effective budget for one
    /// session is the minimum of this and the role's own cap.
    pub wall_timeout_ms: u64,
    /// Grace between SIGTERM and SIGKILL.
    pub shutdown_grace_ms: u64,
}

/// Terminal result of one session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub cancelled: bool,
    /// Future timestamp from a completion record, when the backend told
    /// us to back off.
    pub rate_limit_until: Option<String>,
}

/// Clonable handle for injecting into and cancelling a session from
/// other tasks while the owner awaits the outcome.
#[derive(Clone)]
pub struct SessionControl {
    id: SessionId,
    injection_path: PathBuf,
    cancel: Arc<Notify>,
    terminated: Arc<AtomicBool>,
}

impl SessionControl {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Same contract as [`RunningSession::inject`].
    pub fn inject(&self, text: &str) -> bool {
        inject_into(&self.injection_path, &self.terminated, &self.id, text)
    }

    /// Same contract as [`RunningSession::cancel`].
    pub fn cancel(&self) {
        self.cancel.notify_one();
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

/// Handle to a live session.
pub struct RunningSession {
    id: SessionId,
    role: Role,
    pid: u32,
    injection_path: PathBuf,
    cancel: Arc<Notify>,
    terminated: Arc<AtomicBool>,
    outcome_rx: oneshot::Receiver<SessionOutcome>,
}

impl RunningSession {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Path of the injection side channel for this session.
    pub fn injection_path(&self) -> &Path {
        &self.injection_path
    }

    /// Clonable inject/cancel handle for use from other tasks.
    pub fn control(&self) -> SessionControl {
        SessionControl {
            id: self.id.clone(),
            injection_path: self.injection_path.clone(),
            cancel: Arc::clone(&self.cancel),
            terminated: Arc::clone(&self.terminated),
        }
    }

    /// Deliver additional user input to the live session.
    ///
    /// Appends a JSON line to the injection side channel the reasoning
    /// process polls at its next safe point. Returns `false` once the
    /// session has terminated; the caller must then buffer the text.
    pub fn inject(&self, text: &str) -> bool {
        inject_into(&self.injection_path, &self.terminated, &self.id, text)
    }

    /// Request cancellation. The driver runs the SIGTERM → SIGKILL
    /// escalation; await [`RunningSession::wait`] for the outcome.
    pub fn cancel(&self) {
        self.cancel.notify_one();
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Wait for the session to finish and return its outcome.
    pub async fn wait(self) -> Result<SessionOutcome, SessionError> {
        self.outcome_rx
            .await
            .map_err(|_| SessionError::SpawnFailed("session driver dropped".to_string()))
    }
}

/// Spawns and supervises one reasoning session at a time.
#[derive(Clone)]
pub struct SessionLauncher<R: ProcessRunner, C: Clock> {
    runner: R,
    clock: C,
    config: LauncherConfig,
    active: Arc<Mutex<Option<SessionId>>>,
}

impl<R: ProcessRunner, C: Clock + 'static> SessionLauncher<R, C> {
    pub fn new(runner: R, clock: C, config: LauncherConfig) -> Self {
        Self {
            runner,
            clock,
            config,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Id of the currently active session, if any.
    pub fn active_session(&self) -> Option<SessionId> {
        self.active.lock().clone()
    }

    /// Launch a session for `role` with the assembled prompt.
    ///
    /// Parsed stdout events stream to `events` as they arrive. Errors
    /// with [`SessionError::Busy`] while another session is active.
    pub async fn launch(
        &self,
        role: Role,
        model: &str,
        prompt: &str,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<RunningSession, SessionError> {
        let id = SessionId::new(uuid::Uuid::new_v4().to_string());
        {
            let mut active = self.active.lock();
            if let Some(running) = active.as_ref() {
                return Err(SessionError::Busy(running.clone()));
            }
            *active = Some(id.clone());
        }

        match self.spawn_session(&id, role, model, prompt, events).await {
            Ok(session) => Ok(session),
            Err(e) => {
                // Release the single-flight slot on failed spawn
                *self.active.lock() = None;
                Err(e)
            }
        }
    }

    async fn spawn_session(
        &self,
        id: &SessionId,
        role: Role,
        model: &str,
        prompt: &str,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<RunningSession, SessionError> {
        let session_dir = self.config.working_dir.join(".session");
        std::fs::create_dir_all(&session_dir)?;
        let injection_path = session_dir.join(format!("inject-{id}.jsonl"));
        std::fs::write(&injection_path, "")?;

        let spec = SpawnSpec {
            command: self.config.command.clone(),
            args: vec![
                "--role".to_string(),
                role.label().to_lowercase(),
                "--model".to_string(),
                model.to_string(),
                "--inject-file".to_string(),
                injection_path.display().to_string(),
                prompt.to_string(),
            ],
            cwd: self.config.working_dir.clone(),
            env: Vec::new(),
        };

        let spawned = self.runner.spawn(&spec).await?;
        let pid = spawned.pid;
        info!(session = %id, %role, pid, "session spawned");

        let cancel = Arc::new(Notify::new());
        let terminated = Arc::new(AtomicBool::new(false));
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let timeout_ms = self
            .config
            .wall_timeout_ms
            .min(role.spec().max_duration_ms);

        tokio::spawn(drive_session(DriverCtx {
            id: id.clone(),
            runner: self.runner.clone(),
            clock: self.clock.clone(),
            spawned,
            events,
            cancel: Arc::clone(&cancel),
            terminated: Arc::clone(&terminated),
            outcome_tx,
            timeout: Duration::from_millis(timeout_ms),
            grace: Duration::from_millis(self.config.shutdown_grace_ms),
            active: Arc::clone(&self.active),
        }));

        Ok(RunningSession {
            id: id.clone(),
            role,
            pid,
            injection_path,
            cancel,
            terminated,
            outcome_rx,
        })
    }
}

struct DriverCtx<R: ProcessRunner, C: Clock> {
    id: SessionId,
    runner: R,
    clock: C,
    spawned: SpawnedProcess,
    events: mpsc::Sender<SessionEvent>,
    cancel: Arc<Notify>,
    terminated: Arc<AtomicBool>,
    outcome_tx: oneshot::Sender<SessionOutcome>,
    timeout: Duration,
    grace: Duration,
    active: Arc<Mutex<Option<SessionId>>>,
}

/// Supervise one session to completion.
async fn drive_session<R: ProcessRunner, C: Clock>(ctx: DriverCtx<R, C>) {
    let DriverCtx {
        id,
        runner,
        clock,
        spawned,
        events,
        cancel,
        terminated,
        outcome_tx,
        timeout,
        grace,
        active,
    } = ctx;

    let started_ms = clock.epoch_ms();
    let SpawnedProcess {
        pid,
        mut stdout,
        mut stderr,
        mut exit,
    } = spawned;

    let deadline = tokio::time::Instant::now() + timeout;
    let mut stdout_buf = String::new();
    let mut stderr_buf = String::new();
    let mut rate_limit_until = None;
    let mut exit_code = None;
    let mut exited = false;
    let mut timed_out = false;
    let mut cancelled = false;
    let mut stdout_open = true;
    let mut stderr_open = true;

    loop {
        tokio::select! {
            maybe = stdout.recv(), if stdout_open => match maybe {
                Some(line) => {
                    handle_stdout_line(&line, &mut stdout_buf, &mut rate_limit_until, &events).await;
                }
                None => stdout_open = false,
            },
            maybe = stderr.recv(), if stderr_open => match maybe {
                Some(line) => {
                    stderr_buf.push_str(&line);
                    stderr_buf.push('\n');
                }
                None => stderr_open = false,
            },
            code = &mut exit => {
                exit_code = code.unwrap_or(None);
                exited = true;
                break;
            }
            _ = cancel.notified() => {
                cancelled = true;
                break;
            }
            _ = tokio::time::sleep_until(deadline) => {
                timed_out = true;
                break;
            }
        }
    }

    // Drain whatever output is already buffered in the channels
    while let Ok(line) = stdout.try_recv() {
        handle_stdout_line(&line, &mut stdout_buf, &mut rate_limit_until, &events).await;
    }
    while let Ok(line) = stderr.try_recv() {
        stderr_buf.push_str(&line);
        stderr_buf.push('\n');
    }

    if !exited {
        exit_code = escalate(&runner, pid, &mut exit, grace).await;
    }

    terminated.store(true, Ordering::SeqCst);
    *active.lock() = None;

    let outcome = SessionOutcome {
        success: !timed_out && !cancelled && exit_code == Some(0),
        exit_code,
        stdout: stdout_buf,
        stderr: stderr_buf,
        duration_ms: clock.epoch_ms().saturating_sub(started_ms),
        timed_out,
        cancelled,
        rate_limit_until,
    };
    info!(
        session = %id,
        success = outcome.success,
        timed_out,
        cancelled,
        duration_ms = outcome.duration_ms,
        "session finished"
    );
    let _ = outcome_tx.send(outcome);
}

async fn handle_stdout_line(
    line: &str,
    stdout_buf: &mut String,
    rate_limit_until: &mut Option<String>,
    events: &mpsc::Sender<SessionEvent>,
) {
    stdout_buf.push_str(line);
    stdout_buf.push('\n');

    let event = parse_line(line);
    if let SessionEvent::Completed {
        rate_limit_until: Some(until),
    } = &event
    {
        *rate_limit_until = Some(until.clone());
    }
    let _ = events.send(event).await;
}

/// SIGTERM, wait the grace period, then SIGKILL. Returns the exit code
/// if the process reported one before going away.
async fn escalate<R: ProcessRunner>(
    runner: &R,
    pid: u32,
    exit: &mut oneshot::Receiver<Option<i32>>,
    grace: Duration,
) -> Option<i32> {
    debug!(pid, "sending SIGTERM");
    if let Err(e) = runner.signal(pid, Sig::Term).await {
        warn!(pid, error = %e, "SIGTERM failed");
    }

    let graceful = tokio::time::timeout(grace, &mut *exit).await;
    match graceful {
        Ok(Ok(code)) => return code,
        Ok(Err(_)) => return None,
        Err(_) => {}
    }

    debug!(pid, "grace expired, sending SIGKILL");
    if let Err(e) = runner.signal(pid, Sig::Kill).await {
        warn!(pid, error = %e, "SIGKILL failed");
    }
    match tokio::time::timeout(grace, exit).await {
        Ok(Ok(code)) => code,
        _ => None,
    }
}

fn inject_into(
    injection_path: &Path,
    terminated: &AtomicBool,
    id: &SessionId,
    text: &str,
) -> bool {
    if terminated.load(Ordering::SeqCst) {
        return false;
    }
    let record = serde_json::json!({ "text": text });
    let appended = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(injection_path)
        .and_then(|mut f| {
            writeln!(f, "{record}")?;
            f.sync_all()
        });
    match appended {
        Ok(()) => true,
        Err(e) => {
            warn!(session = %id, error = %e, "injection write failed");
            false
        }
    }
}

/// Read back the lines injected into a session's side channel, in call
/// order. Used by prompt assembly when a session ends with unconsumed
/// injections.
pub fn read_injected_lines(injection_path: &Path) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(injection_path) else {
        return Vec::new();
    };
    content
        .lines()
        .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .filter_map(|v| v.get("text").and_then(|t| t.as_str()).map(str::to_string))
        .collect()
}

#[cfg(test)]
#[path = "launcher_tests.rs"]
mod tests;
