// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Role vocabulary and capability records.
//!
//! Roles are a closed set. Shared behaviour hangs off a static
//! [`RoleSpec`] per role (read set, write set, session budget) instead of
//! a trait hierarchy; the daemon looks capabilities up through
//! [`Role::spec`] and enforces the write set before any substrate write.

use crate::doc::DocKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four cognitive roles the loop drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Plans the next action.
    Ego,
    /// Executes one smallest step of the plan.
    Subconscious,
    /// Audits the other roles and gates proposals.
    Superego,
    /// Produces goal candidates when the plan is empty.
    Id,
}

/// Static capability record for a role.
#[derive(Debug, Clone, Copy)]
pub struct RoleSpec {
    /// Uppercase tag used in PROGRESS/CONVERSATION line prefixes.
    pub label: &'static str,
    /// Documents this role's prompt may be assembled from.
    pub read_set: &'static [DocKind],
    /// Documents this role may write after its session.
    pub write_set: &'static [DocKind],
    /// Hard cap on one session's duration for this role.
    pub max_duration_ms: u64,
}

const ALL_DOCS: &[DocKind] = &DocKind::ALL;

const EGO: RoleSpec = RoleSpec {
    label: "EGO",
    read_set: ALL_DOCS,
    write_set: &[DocKind::Plan, DocKind::Conversation],
    max_duration_ms: 20 * 60 * 1000,
};

const SUBCONSCIOUS: RoleSpec = RoleSpec {
    label: "SUBCONSCIOUS",
    read_set: &[
        DocKind::Plan,
        DocKind::Progress,
        DocKind::Memory,
        DocKind::Skills,
        DocKind::Habits,
    ],
    // Memory/Habits/Security changes travel as proposals to Superego,
    // never as direct writes.
    write_set: &[DocKind::Plan, DocKind::Progress, DocKind::Skills],
    max_duration_ms: 20 * 60 * 1000,
};

const SUPEREGO: RoleSpec = RoleSpec {
    label: "SUPEREGO",
    read_set: ALL_DOCS,
    write_set: &[
        DocKind::Progress,
        DocKind::Memory,
        DocKind::Habits,
        DocKind::Security,
        DocKind::Superego,
        DocKind::Plan,
    ],
    max_duration_ms: 10 * 60 * 1000,
};

const ID: RoleSpec = RoleSpec {
    label: "ID",
    read_set: &[DocKind::Identity, DocKind::Values, DocKind::Charter],
    write_set: &[],
    max_duration_ms: 10 * 60 * 1000,
};

impl Role {
    /// Capability record for this role.
    pub fn spec(self) -> &'static RoleSpec {
        match self {
            Role::Ego => &EGO,
            Role::Subconscious => &SUBCONSCIOUS,
            Role::Superego => &SUPEREGO,
            Role::Id => &ID,
        }
    }

    /// Uppercase tag for substrate line prefixes.
    pub fn label(self) -> &'static str {
        self.spec().label
    }

    /// Whether this role may write the given document.
    pub fn may_write(self, kind: DocKind) -> bool {
        self.spec().write_set.contains(&kind)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
#[path = "role_tests.rs"]
mod tests;
