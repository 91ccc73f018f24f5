// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health history under `<substrate>/.metrics/`.
//!
//! One JSONL line per cycle plus a `baseline.json` written once at
//! first run. Best-effort: metrics failures never disturb the loop.

use anima_core::LoopStatus;
use std::io::Write as _;
use std::path::PathBuf;
use tracing::warn;

#[derive(Clone)]
pub struct HealthMetrics {
    dir: PathBuf,
}

impl HealthMetrics {
    pub fn new(substrate_root: impl Into<PathBuf>) -> Self {
        Self {
            dir: substrate_root.into().join(".metrics"),
        }
    }

    /// Write `baseline.json` if it does not exist yet.
    pub fn ensure_baseline(&self, now_ms: u64) {
        let path = self.dir.join("baseline.json");
        if path.exists() {
            return;
        }
        let baseline = serde_json::json!({
            "createdAt": anima_core::iso_ts(now_ms),
            "version": env!("CARGO_PKG_VERSION"),
        });
        if let Err(e) = std::fs::create_dir_all(&self.dir)
            .and_then(|_| std::fs::write(&path, baseline.to_string()))
        {
            warn!(error = %e, "failed to write metrics baseline");
        }
    }

    /// Append one health record.
    pub fn record(
        &self,
        now_ms: u64,
        status: &LoopStatus,
        consecutive_idle_cycles: u64,
        last_activity_ms: u64,
    ) {
        let line = serde_json::json!({
            "ts": now_ms,
            "state": status.state,
            "cycleNumber": status.cycle_number,
            "consecutiveIdleCycles": consecutive_idle_cycles,
            "lastActivityMs": last_activity_ms,
        });
        let appended = std::fs::create_dir_all(&self.dir).and_then(|_| {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join("health_metrics.jsonl"))?;
            writeln!(file, "{line}")
        });
        if let Err(e) = appended {
            warn!(error = %e, "failed to append health metrics");
        }
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
