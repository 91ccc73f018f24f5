// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The conversation document.
//!
//! Entries are timestamped append-only lines like every other log, with
//! one extra: messages that arrive while the loop is effectively paused
//! carry an `[UNPROCESSED]` marker so the next Ego prompt can pick them
//! up. Growth is bounded by archiving, which moves the oldest entries to
//! `archive/conversation/` and leaves a pointer under the
//! `## Recent Conversation` heading.

use crate::store::{write_atomic, Substrate};
use crate::SubstrateError;
use anima_core::{iso_ts, parse_iso_ts, Clock, DocKind};
use std::path::PathBuf;
use tracing::info;

/// Marker carried by entries that were not delivered to a live session.
pub const UNPROCESSED_MARKER: &str = "[UNPROCESSED]";

/// Conversation writer with archiving.
#[derive(Clone)]
pub struct ConversationLog<C: Clock> {
    substrate: Substrate<C>,
    /// Entry count past which archiving triggers.
    max_lines: usize,
    /// Optional age trigger for the oldest entry.
    max_entry_age_ms: Option<u64>,
}

impl<C: Clock> ConversationLog<C> {
    pub fn new(substrate: Substrate<C>, max_lines: usize) -> Self {
        Self {
            substrate,
            max_lines: max_lines.max(2),
            max_entry_age_ms: None,
        }
    }

    /// Also archive when the oldest entry exceeds this age.
    pub fn with_max_entry_age_ms(mut self, age_ms: u64) -> Self {
        self.max_entry_age_ms = Some(age_ms);
        self
    }

    /// Append one entry. `unprocessed` marks messages that missed a live
    /// session. Returns the written line.
    pub async fn append(
        &self,
        role_label: &str,
        text: &str,
        unprocessed: bool,
    ) -> Result<String, SubstrateError> {
        let body = if unprocessed {
            format!("{UNPROCESSED_MARKER} {text}")
        } else {
            text.to_string()
        };
        self.substrate
            .append(DocKind::Conversation, role_label, &body)
            .await
    }

    /// Archive the oldest entries when either trigger fires.
    ///
    /// Size and age triggers are disjunctive; at most one archive slice
    /// is written per call. Returns the archive path when one was made.
    pub async fn archive_if_needed(&self) -> Result<Option<PathBuf>, SubstrateError> {
        let _guard = self
            .substrate
            .locks()
            .lock(DocKind::Conversation)
            .await;

        let content = self.substrate.read_locked(DocKind::Conversation)?;
        let entries: Vec<&str> = content
            .text
            .lines()
            .filter(|l| is_entry_line(l))
            .collect();

        let over_count = entries.len() > self.max_lines;
        let over_age = match (self.max_entry_age_ms, entries.first()) {
            (Some(age_ms), Some(first)) => entry_ts_ms(first)
                .map(|ts| self.substrate.clock().epoch_ms().saturating_sub(ts) > age_ms)
                .unwrap_or(false),
            _ => false,
        };
        if !over_count && !over_age {
            return Ok(None);
        }

        // Keep the newest half of the threshold; everything older moves out.
        let keep_recent = (self.max_lines / 2).max(1);
        if entries.len() <= keep_recent {
            return Ok(None);
        }
        let archive_count = entries.len() - keep_recent;

        let now_iso = iso_ts(self.substrate.clock().epoch_ms());
        let archive_name = format!("conversation-{}.md", now_iso.replace(':', "-"));
        let archive_path = self
            .substrate
            .root()
            .join("archive")
            .join("conversation")
            .join(&archive_name);

        let mut archived = String::from("# Archived Conversation\n\n");
        for line in &entries[..archive_count] {
            archived.push_str(line);
            archived.push('\n');
        }
        write_atomic(&archive_path, &archived)?;

        let mut rebuilt = format!(
            "# Conversation\n\n## Recent Conversation\n\n\
             _Earlier entries archived to archive/conversation/{archive_name}_\n\n"
        );
        for line in &entries[archive_count..] {
            rebuilt.push_str(line);
            rebuilt.push('\n');
        }
        let path = self.substrate.path(DocKind::Conversation);
        write_atomic(&path, &rebuilt)?;
        self.substrate.invalidate_cache(&path);

        info!(
            archived = archive_count,
            kept = keep_recent,
            archive = %archive_path.display(),
            "archived conversation slice"
        );
        Ok(Some(archive_path))
    }

    /// Entries currently marked `[UNPROCESSED]`, oldest first.
    pub async fn unprocessed_entries(&self) -> Result<Vec<String>, SubstrateError> {
        let content = self.substrate.read(DocKind::Conversation).await?;
        Ok(content
            .text
            .lines()
            .filter(|l| is_entry_line(l) && l.contains(UNPROCESSED_MARKER))
            .map(str::to_string)
            .collect())
    }
}

/// Whether a line is a timestamped conversation entry.
fn is_entry_line(line: &str) -> bool {
    entry_ts_ms(line).is_some()
}

/// Parse the leading `[<ISO>]` timestamp of an entry line.
fn entry_ts_ms(line: &str) -> Option<u64> {
    let rest = line.strip_prefix('[')?;
    let (ts, _) = rest.split_once(']')?;
    parse_iso_ts(ts)
}

#[cfg(test)]
#[path = "conversation_tests.rs"]
mod tests;
