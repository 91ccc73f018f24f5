// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The substrate store: initialisation, validation, reads, atomic
//! overwrites, and timestamped appends with rotation.
//!
//! All document I/O happens under the per-document lock. Overwrites go
//! through a temp-file-and-rename so a partial file is never visible;
//! appends rotate once the configured byte cap is crossed.

use crate::cache::ReadCache;
use crate::lock::DocLocks;
use crate::rotate::{rotated_name, split_for_rotation};
use crate::validate::{validate_doc, ValidationReport};
use crate::SubstrateError;
use anima_core::{iso_ts, Clock, DocKind, WriteMode};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// A document read: full text plus the file's modification time.
#[derive(Debug, Clone)]
pub struct DocContent {
    pub text: String,
    pub modified_ms: u64,
}

/// The substrate store.
///
/// Cheap to clone; all shared state is behind the lock table and cache.
#[derive(Clone)]
pub struct Substrate<C: Clock> {
    root: PathBuf,
    locks: DocLocks,
    cache: Option<ReadCache>,
    clock: C,
    progress_max_bytes: u64,
}

impl<C: Clock> Substrate<C> {
    pub fn new(root: impl Into<PathBuf>, clock: C) -> Self {
        Self {
            root: root.into(),
            locks: DocLocks::new(),
            cache: None,
            clock,
            progress_max_bytes: 256 * 1024,
        }
    }

    /// Enable the mtime-indexed read cache.
    pub fn with_cache(mut self) -> Self {
        self.cache = Some(ReadCache::new());
        self
    }

    /// Set the append-only rotation cap in bytes.
    pub fn with_progress_cap(mut self, max_bytes: u64) -> Self {
        self.progress_max_bytes = max_bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for a document kind.
    pub fn path(&self, kind: DocKind) -> PathBuf {
        self.root.join(kind.file_name())
    }

    pub(crate) fn locks(&self) -> &DocLocks {
        &self.locks
    }

    pub(crate) fn clock(&self) -> &C {
        &self.clock
    }

    pub(crate) fn invalidate_cache(&self, path: &Path) {
        if let Some(cache) = &self.cache {
            cache.invalidate(path);
        }
    }

    /// Create the substrate directory tree and any missing documents.
    ///
    /// Existing files are left untouched, so init is idempotent.
    pub async fn init(&self) -> Result<(), SubstrateError> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(self.root.join("archive").join("conversation"))?;
        fs::create_dir_all(self.root.join("audit"))?;
        fs::create_dir_all(self.root.join(".metrics"))?;

        for kind in DocKind::ALL {
            let path = self.path(kind);
            if !path.exists() {
                let _guard = self.locks.lock(kind).await;
                write_atomic(&path, kind.template())?;
                debug!(doc = %kind, "initialised from template");
            }
        }

        info!(root = %self.root.display(), "substrate initialised");
        Ok(())
    }

    /// Validate every document against its structural rules.
    ///
    /// Missing required files and malformed content are reported; a
    /// missing optional file is not a problem.
    pub async fn validate(&self) -> Result<ValidationReport, SubstrateError> {
        let mut report = ValidationReport::ok();

        for kind in DocKind::ALL {
            let path = self.path(kind);
            if !path.exists() {
                if kind.required() {
                    report.push(kind, "required document missing");
                }
                continue;
            }
            let text = fs::read_to_string(&path)?;
            for problem in validate_doc(kind, &text) {
                report.push(kind, problem);
            }
        }

        Ok(report)
    }

    /// Read a document under its lock.
    pub async fn read(&self, kind: DocKind) -> Result<DocContent, SubstrateError> {
        let _guard = self.locks.lock(kind).await;
        self.read_locked(kind)
    }

    /// Read without taking the lock; the caller must hold it.
    pub(crate) fn read_locked(&self, kind: DocKind) -> Result<DocContent, SubstrateError> {
        let path = self.path(kind);
        let meta = fs::metadata(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                SubstrateError::Missing(kind)
            } else {
                SubstrateError::Io(e)
            }
        })?;
        let mtime = meta.modified()?;

        if let Some(cache) = &self.cache {
            if let Some(text) = cache.get(&path, mtime) {
                return Ok(DocContent {
                    text: text.to_string(),
                    modified_ms: system_time_ms(mtime),
                });
            }
        }

        let text = fs::read_to_string(&path)?;
        if let Some(cache) = &self.cache {
            cache.put(&path, mtime, &text);
        }
        Ok(DocContent {
            text,
            modified_ms: system_time_ms(mtime),
        })
    }

    /// Replace a document's content atomically.
    ///
    /// The new text must pass the kind's structural validation, and the
    /// kind must be an overwrite-mode document.
    pub async fn overwrite(&self, kind: DocKind, text: &str) -> Result<(), SubstrateError> {
        if kind.write_mode() != WriteMode::Overwrite {
            return Err(SubstrateError::WrongWriteMode {
                kind,
                expected: WriteMode::Overwrite,
            });
        }
        let problems = validate_doc(kind, text);
        if !problems.is_empty() {
            return Err(SubstrateError::Invalid { kind, problems });
        }

        let path = self.path(kind);
        let _guard = self.locks.lock(kind).await;
        write_atomic(&path, text)?;
        self.invalidate_cache(&path);
        Ok(())
    }

    /// Append one timestamped entry to an append-only document.
    ///
    /// Newlines inside `text` are flattened so each entry is exactly one
    /// line of the form `[<ISO>] [<ROLE>] <text>`. Returns the written
    /// line (without trailing newline). Rotation runs after the append
    /// when the file crosses the byte cap.
    pub async fn append(
        &self,
        kind: DocKind,
        role_label: &str,
        text: &str,
    ) -> Result<String, SubstrateError> {
        if kind.write_mode() != WriteMode::AppendOnly {
            return Err(SubstrateError::WrongWriteMode {
                kind,
                expected: WriteMode::AppendOnly,
            });
        }

        let line = format!(
            "[{}] [{}] {}",
            iso_ts(self.clock.epoch_ms()),
            role_label,
            text.replace(['\r', '\n'], " ").trim()
        );

        let path = self.path(kind);
        let _guard = self.locks.lock(kind).await;

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        drop(file);
        self.invalidate_cache(&path);

        // CONVERSATION is managed by archiving, not rotation
        if kind == DocKind::Progress {
            self.rotate_if_needed(kind, &path)?;
        }
        Ok(line)
    }

    /// Rotate an append-only document once it crosses the byte cap.
    ///
    /// The head moves to a `.rotated` sibling; the live file keeps a
    /// whole-line tail of at most half the cap. Caller holds the lock.
    fn rotate_if_needed(&self, kind: DocKind, path: &Path) -> Result<(), SubstrateError> {
        let size = fs::metadata(path)?.len();
        if size < self.progress_max_bytes {
            return Ok(());
        }

        let content = fs::read_to_string(path)?;
        let tail_keep = (self.progress_max_bytes / 2) as usize;
        let (head, tail) = split_for_rotation(&content, tail_keep);
        if head.is_empty() {
            return Ok(());
        }

        let rotated = self
            .root
            .join(rotated_name(kind.file_name(), &iso_ts(self.clock.epoch_ms())));
        let mut rotated_file = File::create(&rotated)?;
        rotated_file.write_all(head.as_bytes())?;
        rotated_file.sync_all()?;

        write_atomic(path, tail)?;
        self.invalidate_cache(path);

        info!(
            doc = %kind,
            rotated = %rotated.display(),
            kept_bytes = tail.len(),
            "rotated append-only document"
        );
        Ok(())
    }
}

fn system_time_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Write `text` to `path` via temp file + rename so no partial file is
/// ever visible. The temp sibling lives in the same directory so the
/// rename stays on one filesystem.
pub(crate) fn write_atomic(path: &Path, text: &str) -> io::Result<()> {
    let tmp_path = temp_sibling(path);

    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(text.as_bytes())?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    // Make the rename durable across power loss
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
