// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Anima host daemon (animad)
//!
//! Single process that owns the cognitive loop and everything around
//! it: substrate I/O, one reasoning session at a time, the message
//! bus, the relay client, the watchdog, and the loop-control HTTP
//! surface.
//!
//! Architecture:
//! - Orchestrator task: drives Ego → Subconscious → Superego cycles
//! - Watchdog task: stall detection, restart via exit code 75
//! - Relay client task + inbound pump: peer messages in and out
//! - Axum server task: loop control REST + `/ws` event stream

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anima_agora::{AgentKeys, PeerRegistry, RelayClient, RelayClientConfig};
use anima_bus::TinyBus;
use anima_core::{Config, SystemClock, EXIT_FATAL, EXIT_RESTART};
use anima_daemon::api::{self, ApiCtx};
use anima_daemon::control::LoopControl;
use anima_daemon::metrics::HealthMetrics;
use anima_daemon::providers::{
    run_peer_inbound, ConversationOnPauseProvider, PeerOutboundProvider, SessionInjectionProvider,
};
use anima_daemon::roles::RoleAgents;
use anima_daemon::watchdog::Watchdog;
use anima_daemon::{env, Orchestrator};
use anima_session::{LauncherConfig, SessionLauncher, TokioProcessRunner};
use anima_substrate::{AgoraInbox, ConversationLog, Substrate};
use fs2::FileExt as _;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Marker left behind when exiting for a supervised restart.
const RESTART_MARKER: &str = ".anima-restart";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("animad {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("animad {}", env!("CARGO_PKG_VERSION"));
                println!("Anima host daemon - drives the agent's cognitive loop");
                println!();
                println!("USAGE:");
                println!("    animad");
                println!();
                println!("Configuration comes from anima.toml (override with ANIMA_CONFIG)");
                println!("plus SUBSTRATE_PATH / PORT / SUPEREGO_AUDIT_INTERVAL overrides.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: animad [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load(&env::config_path())?;

    let log_path = config.working_directory.join("animad.log");
    rotate_log_if_needed(&log_path);
    let log_guard = setup_logging(&log_path)?;

    let exit_code = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(config));

    drop(log_guard);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

async fn run(config: Config) -> i32 {
    info!(version = env!("CARGO_PKG_VERSION"), "starting animad");
    let clock = SystemClock;
    let now = anima_core::Clock::epoch_ms(&clock);

    // Single-instance lock
    let lock_path = config.working_directory.join(".animad.pid");
    let lock_file = match acquire_pid_lock(&lock_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("animad is already running ({e})");
            return EXIT_FATAL;
        }
    };

    // Substrate: init then validate; an invalid substrate is fatal
    let first_run = !config.substrate_path.exists();
    let substrate = {
        let mut substrate = Substrate::new(&config.substrate_path, clock.clone())
            .with_progress_cap(config.progress_max_bytes);
        if config.enable_file_read_cache {
            substrate = substrate.with_cache();
        }
        substrate
    };
    if let Err(e) = substrate.init().await {
        error!(error = %e, "substrate init failed");
        return EXIT_FATAL;
    }
    match substrate.validate().await {
        Ok(report) if !report.valid => {
            error!(problems = ?report.problems, "substrate validation failed");
            return EXIT_FATAL;
        }
        Ok(_) => {}
        Err(e) => {
            error!(error = %e, "substrate validation errored");
            return EXIT_FATAL;
        }
    }

    let conversation = ConversationLog::new(substrate.clone(), config.conversation_max_lines);
    let inbox = AgoraInbox::new(substrate.clone());
    let metrics = HealthMetrics::new(substrate.root());
    metrics.ensure_baseline(now);

    let control = LoopControl::new(now);
    let launcher = SessionLauncher::new(
        TokioProcessRunner,
        clock.clone(),
        LauncherConfig {
            command: config.session_command.clone(),
            working_dir: config.working_directory.clone(),
            wall_timeout_ms: config.session_timeout_ms,
            shutdown_grace_ms: config.shutdown_grace_ms,
        },
    );
    let agents = RoleAgents::new(
        substrate.clone(),
        conversation.clone(),
        launcher,
        control.clone(),
        clock.clone(),
        config.clone(),
    );

    // Bus + providers
    let bus = TinyBus::new(clock.clone());
    bus.register(Arc::new(SessionInjectionProvider::new(
        control.clone(),
        clock.clone(),
    )));
    bus.register(Arc::new(ConversationOnPauseProvider::new(
        control.clone(),
        conversation.clone(),
    )));

    // Relay client, when a relay is configured
    if let Some(relay_url) = config.agora.relay_url.clone() {
        let keys = match env::agent_secret_hex() {
            Some(secret) => match AgentKeys::from_secret_hex(&secret) {
                Ok(keys) => keys,
                Err(e) => {
                    error!(error = %e, "invalid ANIMA_AGENT_SECRET");
                    return EXIT_FATAL;
                }
            },
            None => {
                warn!("no ANIMA_AGENT_SECRET set, generating an ephemeral keypair");
                AgentKeys::generate()
            }
        };
        info!(fingerprint = %keys.fingerprint(), "agora identity ready");

        let (client, inbound_rx) = RelayClient::new(
            RelayClientConfig::new(relay_url),
            keys,
            PeerRegistry::new(),
            config.agora.security.unknown_sender_policy,
        );
        bus.register(Arc::new(PeerOutboundProvider::new(client.clone())));
        tokio::spawn(client.run());
        tokio::spawn(run_peer_inbound(
            inbound_rx,
            bus.clone(),
            inbox,
            control.clone(),
            clock.clone(),
            config.agora.security.per_sender_rate_limit.clone(),
        ));
    }

    if let Err(e) = bus.start().await {
        error!(error = %e, "bus start failed");
        return EXIT_FATAL;
    }

    // HTTP surface
    let api_ctx = Arc::new(ApiCtx {
        control: control.clone(),
        bus: bus.clone(),
        clock: clock.clone(),
        api_token: config.api_token.clone(),
    });
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "cannot bind UI port");
            return EXIT_FATAL;
        }
    };
    info!(%addr, "ui listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, api::router(api_ctx)).await {
            error!(error = %e, "ui server stopped");
        }
    });

    // Watchdog
    let (restart_tx, mut restart_rx) = mpsc::channel(1);
    tokio::spawn(Watchdog::new(control.clone(), config.watchdog.clone(), clock.clone()).run(restart_tx));

    // Orchestrator
    let orchestrator = Orchestrator::new(
        control.clone(),
        agents,
        clock.clone(),
        config.clone(),
        metrics,
    );
    let orchestrator_handle = tokio::spawn(orchestrator.run());

    // Auto-start
    let restart_marker = config.working_directory.join(RESTART_MARKER);
    let after_restart = restart_marker.exists();
    if after_restart {
        let _ = std::fs::remove_file(&restart_marker);
    }
    if (first_run && config.auto_start_on_first_run)
        || (after_restart && config.auto_start_after_restart)
    {
        info!(first_run, after_restart, "auto-starting loop");
        let _ = control.start(anima_core::Clock::epoch_ms(&clock));
    }

    // Signal handling
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "signal handler");
            return EXIT_FATAL;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "signal handler");
            return EXIT_FATAL;
        }
    };

    info!("animad ready");
    println!("READY");

    let exit_code = tokio::select! {
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
            0
        }
        _ = sigint.recv() => {
            info!("received SIGINT, shutting down");
            0
        }
        _ = restart_rx.recv() => {
            warn!("watchdog requested restart");
            let _ = std::fs::write(&restart_marker, "");
            EXIT_RESTART
        }
    };

    // Graceful shutdown: cancel the session, drain the bus, stop tasks
    let now = anima_core::Clock::epoch_ms(&clock);
    control.shutdown(now);
    bus.stop(Duration::from_millis(config.shutdown_grace_ms)).await;
    let _ = tokio::time::timeout(
        Duration::from_millis(config.shutdown_grace_ms * 2),
        orchestrator_handle,
    )
    .await;

    drop(lock_file);
    let _ = std::fs::remove_file(&lock_path);
    info!("animad stopped");
    exit_code
}

/// Take the PID lock, failing if another instance holds it.
fn acquire_pid_lock(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    file.try_lock_exclusive()?;
    use std::io::Write as _;
    let mut file = file;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep.
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log at startup if it has grown too large.
///
/// Shifts `animad.log` → `animad.log.1` → `.2` → `.3`, deleting the
/// oldest. Best-effort: rotation failures are ignored so the daemon
/// still starts.
fn rotate_log_if_needed(log_path: &Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    log_path: &Path,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let dir = log_path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    let file_name = log_path
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad log path"))?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
