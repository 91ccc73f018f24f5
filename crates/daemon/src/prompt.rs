// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt assembly.
//!
//! Each role's prompt is its permitted substrate slices in canonical
//! order, the queued incoming messages (Ego only), and any extra
//! context the caller threads in (proposals for Superego, goal
//! candidates for the idle gate). The role-specific instruction text
//! itself ships with the reasoning command; the shell only assembles
//! state.

use anima_core::{DocKind, Role};

/// One readable substrate slice.
pub struct DocSlice {
    pub kind: DocKind,
    pub text: String,
}

/// Assemble the prompt for one session.
pub fn build(
    role: Role,
    slices: &[DocSlice],
    pending_messages: &[String],
    extra: Option<&str>,
) -> String {
    let mut prompt = format!("ROLE: {}\n", role.label());

    for slice in slices {
        prompt.push_str(&format!("\n<<DOC {}>>\n", slice.kind.name()));
        prompt.push_str(slice.text.trim_end());
        prompt.push_str(&format!("\n<<END {}>>\n", slice.kind.name()));
    }

    if !pending_messages.is_empty() {
        prompt.push_str("\n<<INCOMING MESSAGES>>\n");
        for message in pending_messages {
            prompt.push_str("- ");
            prompt.push_str(message);
            prompt.push('\n');
        }
        prompt.push_str("<<END INCOMING MESSAGES>>\n");
    }

    if let Some(extra) = extra {
        prompt.push('\n');
        prompt.push_str(extra.trim_end());
        prompt.push('\n');
    }

    prompt
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
