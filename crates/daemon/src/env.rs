// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

/// Config file path: `ANIMA_CONFIG` or `./anima.toml`.
pub fn config_path() -> PathBuf {
    std::env::var("ANIMA_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("anima.toml"))
}

/// Relay client secret key (hex), if provided. Without it a fresh
/// keypair is generated per process.
pub fn agent_secret_hex() -> Option<String> {
    std::env::var("ANIMA_AGENT_SECRET").ok()
}
