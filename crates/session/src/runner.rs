// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process runner adapter.
//!
//! The launcher never touches `tokio::process` directly; it goes through
//! this trait so tests can drive sessions with a scripted fake.

use crate::SessionError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};

/// Signals the launcher escalates through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sig {
    Term,
    Kill,
}

/// What to spawn.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

/// A spawned reasoning process.
///
/// Stdout and stderr arrive as whole lines; `exit` resolves once with
/// the exit code (None when killed by signal).
pub struct SpawnedProcess {
    pub pid: u32,
    pub stdout: mpsc::Receiver<String>,
    pub stderr: mpsc::Receiver<String>,
    pub exit: oneshot::Receiver<Option<i32>>,
}

/// Adapter for spawning and signalling the reasoning subprocess.
#[async_trait]
pub trait ProcessRunner: Clone + Send + Sync + 'static {
    /// Spawn with stdin closed and stdout/stderr piped.
    async fn spawn(&self, spec: &SpawnSpec) -> Result<SpawnedProcess, SessionError>;

    /// Deliver a signal to a previously spawned process.
    async fn signal(&self, pid: u32, sig: Sig) -> Result<(), SessionError>;
}

/// Production runner backed by `tokio::process`.
#[derive(Clone, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn spawn(&self, spec: &SpawnSpec) -> Result<SpawnedProcess, SessionError> {
        let mut cmd = tokio::process::Command::new(&spec.command);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| SessionError::SpawnFailed(format!("{}: {}", spec.command, e)))?;
        let pid = child
            .id()
            .ok_or_else(|| SessionError::SpawnFailed("child exited before pid read".into()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("stdout not piped".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("stderr not piped".into()))?;

        let (stdout_tx, stdout_rx) = mpsc::channel(256);
        let (stderr_tx, stderr_rx) = mpsc::channel(256);
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(pump_lines(stdout, stdout_tx));
        tokio::spawn(pump_lines(stderr, stderr_tx));
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(_) => None,
            };
            let _ = exit_tx.send(code);
        });

        Ok(SpawnedProcess {
            pid,
            stdout: stdout_rx,
            stderr: stderr_rx,
            exit: exit_rx,
        })
    }

    async fn signal(&self, pid: u32, sig: Sig) -> Result<(), SessionError> {
        let signal = match sig {
            Sig::Term => nix::sys::signal::Signal::SIGTERM,
            Sig::Kill => nix::sys::signal::Signal::SIGKILL,
        };
        let pid = nix::unistd::Pid::from_raw(pid as i32);
        match nix::sys::signal::kill(pid, signal) {
            Ok(()) => Ok(()),
            // Already gone is success from the caller's point of view
            Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(SessionError::SignalFailed(e.to_string())),
        }
    }
}

async fn pump_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}
