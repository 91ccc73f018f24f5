// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-document mutual exclusion.
//!
//! One async mutex per [`DocKind`], created up front. Locks are
//! process-local and non-reentrant; holding one across an `.await` is the
//! point (file I/O happens under it). Multi-document operations must go
//! through [`DocLocks::lock_many`], which acquires in canonical enum
//! order so two such operations can never deadlock.

use anima_core::DocKind;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// The full set of per-document locks.
#[derive(Clone)]
pub struct DocLocks {
    locks: Arc<HashMap<DocKind, Arc<Mutex<()>>>>,
}

impl DocLocks {
    pub fn new() -> Self {
        let locks = DocKind::ALL
            .iter()
            .map(|&kind| (kind, Arc::new(Mutex::new(()))))
            .collect();
        Self {
            locks: Arc::new(locks),
        }
    }

    /// Acquire the lock for one document.
    pub async fn lock(&self, kind: DocKind) -> OwnedMutexGuard<()> {
        // Every DocKind is inserted at construction
        let mutex = Arc::clone(&self.locks[&kind]);
        mutex.lock_owned().await
    }

    /// Acquire several document locks in canonical order.
    ///
    /// Duplicates are collapsed; the input order is irrelevant.
    pub async fn lock_many(&self, kinds: &[DocKind]) -> Vec<OwnedMutexGuard<()>> {
        let mut wanted: Vec<DocKind> = kinds.to_vec();
        wanted.sort();
        wanted.dedup();

        let mut guards = Vec::with_capacity(wanted.len());
        for kind in wanted {
            guards.push(self.lock(kind).await);
        }
        guards
    }
}

impl Default for DocLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
