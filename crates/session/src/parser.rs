// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stdout stream parsing.
//!
//! The reasoning command emits one JSON record per line:
//! `{"type":"text","content":"..."}`, `{"type":"tool_use","name":"...",
//! "input":{...}}`, `{"type":"completion","rateLimitUntil":"..."}`,
//! `{"type":"error","message":"..."}`. Anything that is not one of
//! those — including plain prose — passes through as a text event.

use serde_json::Value;

/// A typed event parsed from one stdout line.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A chunk of model output.
    Text { content: String },
    /// The model invoked a tool.
    ToolUse { name: String, input: Value },
    /// The session finished its turn. May carry a future rate-limit
    /// timestamp the orchestrator must honour.
    Completed { rate_limit_until: Option<String> },
    /// The session reported an error.
    Error { message: String },
}

/// Parse one stdout line into an event.
pub fn parse_line(line: &str) -> SessionEvent {
    let Ok(json) = serde_json::from_str::<Value>(line) else {
        return SessionEvent::Text {
            content: line.to_string(),
        };
    };

    match json.get("type").and_then(Value::as_str) {
        Some("text") => SessionEvent::Text {
            content: json
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        Some("tool_use") => SessionEvent::ToolUse {
            name: json
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            input: json.get("input").cloned().unwrap_or(Value::Null),
        },
        Some("completion") => SessionEvent::Completed {
            rate_limit_until: json
                .get("rateLimitUntil")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        Some("error") => SessionEvent::Error {
            message: json
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        },
        // JSON we don't recognise is still output worth surfacing
        _ => SessionEvent::Text {
            content: line.to_string(),
        },
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
