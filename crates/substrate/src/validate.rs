// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structural validation for substrate documents.

use anima_core::DocKind;
use serde::{Deserialize, Serialize};

/// One structural violation found during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub kind: DocKind,
    pub message: String,
}

/// Startup validation result for the whole substrate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub problems: Vec<Problem>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            valid: true,
            problems: Vec::new(),
        }
    }

    pub fn push(&mut self, kind: DocKind, message: impl Into<String>) {
        self.valid = false;
        self.problems.push(Problem {
            kind,
            message: message.into(),
        });
    }
}

/// Check one document's structure. Returns the list of violations,
/// empty when the document is well-formed.
pub fn validate_doc(kind: DocKind, text: &str) -> Vec<String> {
    let mut problems = Vec::new();

    let heading = kind.required_heading();
    if !text.lines().any(|l| l.trim_end() == heading) {
        problems.push(format!("missing top-level heading `{heading}`"));
    }

    match kind {
        DocKind::Plan => {
            let has_task = text
                .lines()
                .any(|l| is_task_line(l.trim_start()));
            if !has_task {
                problems.push("PLAN has no task list (`- [ ]` items)".to_string());
            }
        }
        DocKind::AgoraInbox => {
            for section in ["## Unread", "## Read"] {
                if !text.lines().any(|l| l.trim_end() == section) {
                    problems.push(format!("missing `{section}` section"));
                }
            }
        }
        _ => {}
    }

    problems
}

/// A markdown task-list line, checked or not.
pub fn is_task_line(trimmed: &str) -> bool {
    trimmed.starts_with("- [ ]") || trimmed.starts_with("- [x]") || trimmed.starts_with("- [X]")
}

/// An unchecked task-list line (an open task).
pub fn is_open_task_line(trimmed: &str) -> bool {
    trimmed.starts_with("- [ ]")
}

/// Count open tasks in PLAN text.
pub fn open_task_count(plan_text: &str) -> usize {
    plan_text
        .lines()
        .filter(|l| is_open_task_line(l.trim_start()))
        .count()
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
