// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! anima-substrate: The markdown substrate — every persistent byte of
//! agent memory lives in one directory of markdown files.
//!
//! This crate owns the three disciplines the rest of the system relies on:
//! per-document mutual exclusion, atomic overwrites (temp file + rename),
//! and timestamped append-only logs with size-capped rotation.

pub mod cache;
pub mod conversation;
pub mod inbox;
pub mod lock;
pub mod rotate;
pub mod store;
pub mod validate;

use thiserror::Error;

pub use cache::ReadCache;
pub use conversation::ConversationLog;
pub use inbox::{AgoraInbox, InboxEntry};
pub use lock::DocLocks;
pub use rotate::rotated_name;
pub use store::{DocContent, Substrate};
pub use validate::{validate_doc, Problem, ValidationReport};

/// Errors from substrate operations.
#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{kind} failed validation: {problems:?}")]
    Invalid {
        kind: anima_core::DocKind,
        problems: Vec<String>,
    },

    #[error("required document missing: {0}")]
    Missing(anima_core::DocKind),

    #[error("document is not {expected:?}: {kind}")]
    WrongWriteMode {
        kind: anima_core::DocKind,
        expected: anima_core::WriteMode,
    },
}
