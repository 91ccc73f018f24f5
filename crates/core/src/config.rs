// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host configuration.
//!
//! Settings come from a TOML file; a handful of environment variables
//! override the file (`SUBSTRATE_PATH`, `PORT`, `SUPEREGO_AUDIT_INTERVAL`,
//! `AGORA_WEBHOOK_TOKEN`; the relay binary additionally reads
//! `AGORA_RELAY_JWT_SECRET` and `AGORA_JWT_EXPIRY_SECONDS` directly).
//! Every field has a default so a missing file yields a runnable
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Loop execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Ego and Subconscious both run each iteration.
    Cycle,
    /// One role runs per iteration, round-robin.
    Tick,
}

/// Policy for envelopes from senders not in the peer registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownSenderPolicy {
    /// Verify a self-certifying envelope (one carrying its own public
    /// key) against the claimed sender, record the key, and deliver it
    /// like any known peer's. Envelopes without key material stay
    /// inbox-only.
    Allow,
    /// Deliver to the inbox only, never to the bus or a session, even
    /// when the envelope could self-certify.
    Quarantine,
    /// Drop silently.
    Reject,
}

/// Watchdog thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub stall_threshold_ms: u64,
    pub check_interval_ms: u64,
    pub force_restart_threshold_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            stall_threshold_ms: 10 * 60 * 1000,
            check_interval_ms: 30 * 1000,
            force_restart_threshold_ms: 30 * 60 * 1000,
        }
    }
}

/// Per-sender inbound rate limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerSenderRateLimit {
    pub enabled: bool,
    pub max_messages: u32,
    pub window_ms: u64,
}

impl Default for PerSenderRateLimit {
    fn default() -> Self {
        Self {
            enabled: true,
            max_messages: 30,
            window_ms: 60_000,
        }
    }
}

/// Agora security knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgoraSecurity {
    pub per_sender_rate_limit: PerSenderRateLimit,
    pub unknown_sender_policy: UnknownSenderPolicy,
}

impl Default for AgoraSecurity {
    fn default() -> Self {
        Self {
            per_sender_rate_limit: PerSenderRateLimit::default(),
            unknown_sender_policy: UnknownSenderPolicy::Quarantine,
        }
    }
}

/// Agora peer network settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AgoraConfig {
    /// Relay WebSocket URL; empty disables the peer client.
    pub relay_url: Option<String>,
    pub security: AgoraSecurity,
    /// Token accepted on webhook-style envelope delivery.
    pub webhook_token: Option<String>,
}

/// Idle-sleep behaviour when the plan stays empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleSleepConfig {
    pub enabled: bool,
    pub idle_cycles_before_sleep: u64,
}

impl Default for IdleSleepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_cycles_before_sleep: 5,
        }
    }
}

/// Resolved host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub substrate_path: PathBuf,
    pub working_directory: PathBuf,
    pub source_code_path: Option<PathBuf>,
    pub backup_path: Option<PathBuf>,

    /// UI HTTP port.
    pub port: u16,
    /// Bearer token required on `/api/*` when set.
    pub api_token: Option<String>,

    /// Default model selector for the reasoning command.
    pub model: String,
    /// Override for strategic roles (Ego, Superego, Id).
    pub strategic_model: Option<String>,
    /// Override for tactical roles (Subconscious).
    pub tactical_model: Option<String>,
    /// Reasoning command; receives the prompt as its final argument.
    pub session_command: String,

    pub mode: Mode,
    pub auto_start_on_first_run: bool,
    pub auto_start_after_restart: bool,

    /// Cycles between Superego audits.
    pub superego_audit_interval: u64,
    pub cycle_delay_ms: u64,
    pub shutdown_grace_ms: u64,
    /// Wall-clock cap for any single session.
    pub session_timeout_ms: u64,

    /// PROGRESS rotation cap.
    pub progress_max_bytes: u64,
    pub enable_file_read_cache: bool,
    /// Conversation line count that triggers archiving.
    pub conversation_max_lines: usize,

    pub watchdog: WatchdogConfig,
    pub agora: AgoraConfig,
    pub idle_sleep: IdleSleepConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            substrate_path: PathBuf::from("substrate"),
            working_directory: PathBuf::from("."),
            source_code_path: None,
            backup_path: None,
            port: 4777,
            api_token: None,
            model: "default".to_string(),
            strategic_model: None,
            tactical_model: None,
            session_command: "reason".to_string(),
            mode: Mode::Cycle,
            auto_start_on_first_run: false,
            auto_start_after_restart: true,
            superego_audit_interval: 5,
            cycle_delay_ms: 30_000,
            shutdown_grace_ms: 5_000,
            session_timeout_ms: 20 * 60 * 1000,
            progress_max_bytes: 256 * 1024,
            enable_file_read_cache: true,
            conversation_max_lines: 400,
            watchdog: WatchdogConfig::default(),
            agora: AgoraConfig::default(),
            idle_sleep: IdleSleepConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => toml::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply recognised environment variables over the file settings.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = std::env::var("SUBSTRATE_PATH") {
            self.substrate_path = PathBuf::from(path);
        }
        if let Ok(port) = std::env::var("PORT") {
            self.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Ok(interval) = std::env::var("SUPEREGO_AUDIT_INTERVAL") {
            self.superego_audit_interval =
                interval.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "SUPEREGO_AUDIT_INTERVAL".to_string(),
                    value: interval.clone(),
                })?;
        }
        if let Ok(token) = std::env::var("AGORA_WEBHOOK_TOKEN") {
            self.agora.webhook_token = Some(token);
        }
        Ok(())
    }

    /// Model selector for a strategic (planning/governance) session.
    pub fn strategic_model(&self) -> &str {
        self.strategic_model.as_deref().unwrap_or(&self.model)
    }

    /// Model selector for a tactical (execution) session.
    pub fn tactical_model(&self) -> &str {
        self.tactical_model.as_deref().unwrap_or(&self.model)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
