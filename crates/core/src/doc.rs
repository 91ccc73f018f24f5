// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The substrate file set.
//!
//! Every persistent memory document the shell touches is one of these
//! kinds. The declaration order of [`DocKind::ALL`] is the canonical lock
//! order: any operation that needs more than one document lock acquires
//! them in this order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a document may be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    /// Whole-file replacement through the atomic writer.
    Overwrite,
    /// Timestamped line appends only; subject to rotation.
    AppendOnly,
    /// Named `##` sections edited as units (the Agora inbox).
    Sections,
}

/// A substrate document kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocKind {
    Plan,
    Progress,
    Conversation,
    Memory,
    Skills,
    Values,
    Habits,
    #[serde(rename = "ID")]
    Identity,
    Security,
    Charter,
    Superego,
    AgoraInbox,
}

impl DocKind {
    /// Every document kind in canonical (lock) order.
    pub const ALL: [DocKind; 12] = [
        DocKind::Plan,
        DocKind::Progress,
        DocKind::Conversation,
        DocKind::Memory,
        DocKind::Skills,
        DocKind::Values,
        DocKind::Habits,
        DocKind::Identity,
        DocKind::Security,
        DocKind::Charter,
        DocKind::Superego,
        DocKind::AgoraInbox,
    ];

    /// File name under the substrate root.
    pub fn file_name(self) -> &'static str {
        match self {
            DocKind::Plan => "PLAN.md",
            DocKind::Progress => "PROGRESS.md",
            DocKind::Conversation => "CONVERSATION.md",
            DocKind::Memory => "MEMORY.md",
            DocKind::Skills => "SKILLS.md",
            DocKind::Values => "VALUES.md",
            DocKind::Habits => "HABITS.md",
            DocKind::Identity => "ID.md",
            DocKind::Security => "SECURITY.md",
            DocKind::Charter => "CHARTER.md",
            DocKind::Superego => "SUPEREGO.md",
            DocKind::AgoraInbox => "AGORA_INBOX.md",
        }
    }

    /// Whether startup validation requires this document to exist.
    pub fn required(self) -> bool {
        !matches!(self, DocKind::Superego | DocKind::AgoraInbox)
    }

    /// The permitted write discipline for this document.
    pub fn write_mode(self) -> WriteMode {
        match self {
            DocKind::Progress | DocKind::Conversation | DocKind::Skills => WriteMode::AppendOnly,
            DocKind::AgoraInbox => WriteMode::Sections,
            _ => WriteMode::Overwrite,
        }
    }

    /// Default content written at substrate initialisation.
    pub fn template(self) -> &'static str {
        match self {
            DocKind::Plan => "# Plan\n\n## Tasks\n\n- [ ] Decide what to do first\n",
            DocKind::Progress => "# Progress\n",
            DocKind::Conversation => "# Conversation\n\n## Recent Conversation\n",
            DocKind::Memory => "# Memory\n\n## Facts\n",
            DocKind::Skills => "# Skills\n\n## Learned\n",
            DocKind::Values => "# Values\n\n## Principles\n",
            DocKind::Habits => "# Habits\n\n## Routines\n",
            DocKind::Identity => "# Identity\n\n## Who I Am\n",
            DocKind::Security => "# Security\n\n## Rules\n",
            DocKind::Charter => "# Charter\n\n## Purpose\n",
            DocKind::Superego => "# Superego\n\n## Standing Judgements\n",
            DocKind::AgoraInbox => "# Agora Inbox\n\n## Unread\n\n## Read\n",
        }
    }

    /// The top-level heading structural validation expects.
    pub fn required_heading(self) -> &'static str {
        match self {
            DocKind::Plan => "# Plan",
            DocKind::Progress => "# Progress",
            DocKind::Conversation => "# Conversation",
            DocKind::Memory => "# Memory",
            DocKind::Skills => "# Skills",
            DocKind::Values => "# Values",
            DocKind::Habits => "# Habits",
            DocKind::Identity => "# Identity",
            DocKind::Security => "# Security",
            DocKind::Charter => "# Charter",
            DocKind::Superego => "# Superego",
            DocKind::AgoraInbox => "# Agora Inbox",
        }
    }

    /// Stable symbolic name used in logs and role capability sets.
    pub fn name(self) -> &'static str {
        match self {
            DocKind::Plan => "PLAN",
            DocKind::Progress => "PROGRESS",
            DocKind::Conversation => "CONVERSATION",
            DocKind::Memory => "MEMORY",
            DocKind::Skills => "SKILLS",
            DocKind::Values => "VALUES",
            DocKind::Habits => "HABITS",
            DocKind::Identity => "ID",
            DocKind::Security => "SECURITY",
            DocKind::Charter => "CHARTER",
            DocKind::Superego => "SUPEREGO",
            DocKind::AgoraInbox => "AGORA_INBOX",
        }
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
#[path = "doc_tests.rs"]
mod tests;
