// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    stopped = { LoopState::Stopped, "STOPPED" },
    running = { LoopState::Running, "RUNNING" },
    paused = { LoopState::Paused, "PAUSED" },
    rate_limited = { LoopState::RateLimited, "RATE_LIMITED" },
    shutting_down = { LoopState::ShuttingDown, "SHUTTING_DOWN" },
)]
fn display_and_serde_agree(state: LoopState, expected: &str) {
    assert_eq!(state.to_string(), expected);
    assert_eq!(
        serde_json::to_string(&state).unwrap(),
        format!("\"{expected}\"")
    );
}

#[test]
fn only_running_accepts_input() {
    assert!(LoopState::Running.accepts_input());
    for state in [
        LoopState::Stopped,
        LoopState::Paused,
        LoopState::RateLimited,
        LoopState::ShuttingDown,
    ] {
        assert!(!state.accepts_input());
    }
}

#[test]
fn status_serializes_camel_case_fields() {
    let status = LoopStatus {
        state: LoopState::RateLimited,
        rate_limit_until: Some("2030-01-01T00:00:00Z".to_string()),
        cycle_number: 7,
    };
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["state"], "RATE_LIMITED");
    assert_eq!(json["rateLimitUntil"], "2030-01-01T00:00:00Z");
    assert_eq!(json["cycleNumber"], 7);
}

#[test]
fn status_omits_absent_rate_limit() {
    let status = LoopStatus {
        state: LoopState::Running,
        rate_limit_until: None,
        cycle_number: 1,
    };
    let json = serde_json::to_value(&status).unwrap();
    assert!(json.get("rateLimitUntil").is_none());
}
