// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mtime-indexed read cache.
//!
//! A hit requires the cached modification time to match the file's
//! current one exactly; any writer (ours or external) invalidates by
//! virtue of bumping mtime. The cache is consulted only when enabled in
//! configuration.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Clone)]
struct CacheSlot {
    mtime: SystemTime,
    text: Arc<str>,
}

/// Process-wide read cache keyed by path.
#[derive(Clone, Default)]
pub struct ReadCache {
    slots: Arc<Mutex<HashMap<PathBuf, CacheSlot>>>,
}

impl ReadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached text when the stored mtime matches.
    pub fn get(&self, path: &Path, mtime: SystemTime) -> Option<Arc<str>> {
        let slots = self.slots.lock();
        let slot = slots.get(path)?;
        (slot.mtime == mtime).then(|| Arc::clone(&slot.text))
    }

    /// Store text read at the given mtime.
    pub fn put(&self, path: &Path, mtime: SystemTime, text: &str) {
        let mut slots = self.slots.lock();
        slots.insert(
            path.to_owned(),
            CacheSlot {
                mtime,
                text: Arc::from(text),
            },
        );
    }

    /// Drop one path's entry (used after overwrites to avoid a stale
    /// window on filesystems with coarse mtime granularity).
    pub fn invalidate(&self, path: &Path) {
        self.slots.lock().remove(path);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
