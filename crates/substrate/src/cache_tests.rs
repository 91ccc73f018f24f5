// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

fn t(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

#[test]
fn hit_requires_matching_mtime() {
    let cache = ReadCache::new();
    let path = Path::new("/s/PLAN.md");

    cache.put(path, t(100), "# Plan");
    assert_eq!(cache.get(path, t(100)).as_deref(), Some("# Plan"));
    assert!(cache.get(path, t(101)).is_none());
}

#[test]
fn miss_on_unknown_path() {
    let cache = ReadCache::new();
    assert!(cache.get(Path::new("/s/MEMORY.md"), t(1)).is_none());
}

#[test]
fn put_replaces_previous_slot() {
    let cache = ReadCache::new();
    let path = Path::new("/s/PLAN.md");

    cache.put(path, t(100), "old");
    cache.put(path, t(200), "new");

    assert!(cache.get(path, t(100)).is_none());
    assert_eq!(cache.get(path, t(200)).as_deref(), Some("new"));
    assert_eq!(cache.len(), 1);
}

#[test]
fn invalidate_removes_entry() {
    let cache = ReadCache::new();
    let path = Path::new("/s/PLAN.md");
    cache.put(path, t(100), "x");
    cache.invalidate(path);
    assert!(cache.get(path, t(100)).is_none());
}
