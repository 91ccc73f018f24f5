// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Agora inbox document.
//!
//! Two named sections, `## Unread` and `## Read`. Inbound peer messages
//! land at the top of Unread; once the agent has handled one it moves to
//! the top of Read, optionally annotated with the reply timestamp. Both
//! operations rewrite the document atomically under its lock.

use crate::store::{write_atomic, Substrate};
use crate::SubstrateError;
use anima_core::{iso_ts, Clock, DocKind};

/// One inbox entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxEntry {
    pub envelope_id: String,
    pub sender: String,
    pub timestamp_ms: u64,
    pub text: String,
}

/// Inbox reader/writer.
#[derive(Clone)]
pub struct AgoraInbox<C: Clock> {
    substrate: Substrate<C>,
}

impl<C: Clock> AgoraInbox<C> {
    pub fn new(substrate: Substrate<C>) -> Self {
        Self { substrate }
    }

    /// Add a message to the top of `## Unread`.
    ///
    /// Re-adding an envelope id that is already present anywhere in the
    /// inbox is a no-op (relay dedup is the primary guard; this is the
    /// substrate-side backstop).
    pub async fn add_unread(&self, entry: &InboxEntry) -> Result<bool, SubstrateError> {
        let _guard = self.substrate.locks().lock(DocKind::AgoraInbox).await;
        let (mut unread, read) = self.load_sections()?;

        if contains_id(&unread, &entry.envelope_id) || contains_id(&read, &entry.envelope_id) {
            return Ok(false);
        }

        unread.insert(0, format_entry(entry));
        self.write_sections(&unread, &read)?;
        Ok(true)
    }

    /// Move an envelope's entry from Unread to the top of Read.
    ///
    /// With `reply_ts_ms` set, the moved line gains a `(replied <ISO>)`
    /// annotation. Marking an id that is already read, or unknown, is a
    /// no-op returning `false`.
    pub async fn mark_read(
        &self,
        envelope_id: &str,
        reply_ts_ms: Option<u64>,
    ) -> Result<bool, SubstrateError> {
        let _guard = self.substrate.locks().lock(DocKind::AgoraInbox).await;
        let (mut unread, mut read) = self.load_sections()?;

        let Some(pos) = unread.iter().position(|l| line_has_id(l, envelope_id)) else {
            return Ok(false);
        };
        let mut line = unread.remove(pos);
        if let Some(ts) = reply_ts_ms {
            line.push_str(&format!(" (replied {})", iso_ts(ts)));
        }
        read.insert(0, line);

        self.write_sections(&unread, &read)?;
        Ok(true)
    }

    /// All unread entries, newest first.
    pub async fn unread(&self) -> Result<Vec<String>, SubstrateError> {
        let _guard = self.substrate.locks().lock(DocKind::AgoraInbox).await;
        Ok(self.load_sections()?.0)
    }

    fn load_sections(&self) -> Result<(Vec<String>, Vec<String>), SubstrateError> {
        let text = match self.substrate.read_locked(DocKind::AgoraInbox) {
            Ok(content) => content.text,
            Err(SubstrateError::Missing(_)) => DocKind::AgoraInbox.template().to_string(),
            Err(e) => return Err(e),
        };

        let mut unread = Vec::new();
        let mut read = Vec::new();
        let mut current: Option<&mut Vec<String>> = None;
        for line in text.lines() {
            let trimmed = line.trim_end();
            if trimmed == "## Unread" {
                current = Some(&mut unread);
            } else if trimmed == "## Read" {
                current = Some(&mut read);
            } else if trimmed.starts_with("## ") || trimmed.starts_with("# ") {
                current = None;
            } else if trimmed.starts_with("- ") {
                if let Some(section) = current.as_deref_mut() {
                    section.push(trimmed.to_string());
                }
            }
        }
        Ok((unread, read))
    }

    fn write_sections(&self, unread: &[String], read: &[String]) -> Result<(), SubstrateError> {
        let mut text = String::from("# Agora Inbox\n\n## Unread\n");
        if !unread.is_empty() {
            text.push('\n');
            for line in unread {
                text.push_str(line);
                text.push('\n');
            }
        }
        text.push_str("\n## Read\n");
        if !read.is_empty() {
            text.push('\n');
            for line in read {
                text.push_str(line);
                text.push('\n');
            }
        }

        let path = self.substrate.path(DocKind::AgoraInbox);
        write_atomic(&path, &text)?;
        self.substrate.invalidate_cache(&path);
        Ok(())
    }
}

fn format_entry(entry: &InboxEntry) -> String {
    format!(
        "- [{}] {} ({}): {}",
        iso_ts(entry.timestamp_ms),
        entry.sender,
        entry.envelope_id,
        entry.text.replace(['\r', '\n'], " ")
    )
}

fn line_has_id(line: &str, envelope_id: &str) -> bool {
    line.contains(&format!("({envelope_id}):"))
}

fn contains_id(lines: &[String], envelope_id: &str) -> bool {
    lines.iter().any(|l| line_has_id(l, envelope_id))
}

#[cfg(test)]
#[path = "inbox_tests.rs"]
mod tests;
