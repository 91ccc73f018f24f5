// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted process runner for tests.
//!
//! Each spawn consumes the next queued [`FakeScript`], replaying its
//! stdout lines with the scripted pacing. Signals are recorded and, per
//! script, SIGTERM can be ignored to exercise the SIGKILL escalation.

use crate::runner::{ProcessRunner, Sig, SpawnSpec, SpawnedProcess};
use crate::SessionError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// One scripted child process.
#[derive(Debug, Clone)]
pub struct FakeScript {
    /// `(delay_ms, line)` pairs emitted on stdout in order.
    pub lines: Vec<(u64, String)>,
    /// Exit code reported after the last line; `None` hangs until
    /// signalled.
    pub exit_code: Option<i32>,
    /// Survive SIGTERM so only SIGKILL ends the child.
    pub ignore_term: bool,
}

impl FakeScript {
    /// A well-behaved child: emits the lines, exits 0.
    pub fn completing(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| (0, l.to_string())).collect(),
            exit_code: Some(0),
            ignore_term: false,
        }
    }

    /// A child that produces nothing and never exits on its own.
    pub fn hanging() -> Self {
        Self {
            lines: Vec::new(),
            exit_code: None,
            ignore_term: false,
        }
    }

    pub fn with_ignore_term(mut self) -> Self {
        self.ignore_term = true;
        self
    }

    pub fn with_line_delay_ms(mut self, delay: u64) -> Self {
        for (d, _) in &mut self.lines {
            *d = delay;
        }
        self
    }
}

/// A recorded signal delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSignal {
    pub pid: u32,
    pub sig: Sig,
}

#[derive(Clone, Default)]
pub struct FakeProcessRunner {
    scripts: Arc<Mutex<VecDeque<FakeScript>>>,
    signals: Arc<Mutex<Vec<RecordedSignal>>>,
    children: Arc<Mutex<HashMap<u32, mpsc::UnboundedSender<Sig>>>>,
    next_pid: Arc<AtomicU32>,
    spawns: Arc<Mutex<Vec<SpawnSpec>>>,
}

impl FakeProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the script for the next spawn.
    pub fn push_script(&self, script: FakeScript) {
        self.scripts.lock().push_back(script);
    }

    /// Signals delivered so far, in order.
    pub fn signals(&self) -> Vec<RecordedSignal> {
        self.signals.lock().clone()
    }

    /// Specs of every spawn so far.
    pub fn spawns(&self) -> Vec<SpawnSpec> {
        self.spawns.lock().clone()
    }
}

#[async_trait]
impl ProcessRunner for FakeProcessRunner {
    async fn spawn(&self, spec: &SpawnSpec) -> Result<SpawnedProcess, SessionError> {
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| FakeScript::completing(&[]));
        let pid = 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.spawns.lock().push(spec.clone());

        let (stdout_tx, stdout_rx) = mpsc::channel(256);
        let (_stderr_tx, stderr_rx) = mpsc::channel(256);
        let (exit_tx, exit_rx) = oneshot::channel();
        let (sig_tx, sig_rx) = mpsc::unbounded_channel();

        self.children.lock().insert(pid, sig_tx);
        let children = Arc::clone(&self.children);
        tokio::spawn(async move {
            run_child(script, stdout_tx, exit_tx, sig_rx).await;
            children.lock().remove(&pid);
        });

        Ok(SpawnedProcess {
            pid,
            stdout: stdout_rx,
            stderr: stderr_rx,
            exit: exit_rx,
        })
    }

    async fn signal(&self, pid: u32, sig: Sig) -> Result<(), SessionError> {
        self.signals.lock().push(RecordedSignal { pid, sig });
        // A missing child mirrors ESRCH: success
        if let Some(tx) = self.children.lock().get(&pid) {
            let _ = tx.send(sig);
        }
        Ok(())
    }
}

async fn run_child(
    script: FakeScript,
    stdout_tx: mpsc::Sender<String>,
    exit_tx: oneshot::Sender<Option<i32>>,
    mut sig_rx: mpsc::UnboundedReceiver<Sig>,
) {
    for (delay_ms, line) in &script.lines {
        let emit = tokio::time::sleep(Duration::from_millis(*delay_ms));
        tokio::pin!(emit);
        loop {
            tokio::select! {
                _ = &mut emit => {
                    let _ = stdout_tx.send(line.clone()).await;
                    break;
                }
                Some(sig) = sig_rx.recv() => {
                    if is_fatal(sig, script.ignore_term) {
                        let _ = exit_tx.send(None);
                        return;
                    }
                }
            }
        }
    }

    if let Some(code) = script.exit_code {
        let _ = exit_tx.send(Some(code));
        return;
    }

    // Hang until a fatal signal arrives
    while let Some(sig) = sig_rx.recv().await {
        if is_fatal(sig, script.ignore_term) {
            let _ = exit_tx.send(None);
            return;
        }
    }
}

fn is_fatal(sig: Sig, ignore_term: bool) -> bool {
    match sig {
        Sig::Term => !ignore_term,
        Sig::Kill => true,
    }
}
