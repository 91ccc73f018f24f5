// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress rotation across multiple generations: concatenating the
//! rotated siblings in name order with the live file reproduces every
//! appended line.

use anima_core::{DocKind, FakeClock};
use anima_substrate::Substrate;
use std::time::Duration;

const JAN_2026: u64 = 1_767_225_600_000;

#[tokio::test]
async fn multi_generation_rotation_preserves_every_line() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    clock.set_epoch_ms(JAN_2026);
    let substrate = Substrate::new(dir.path(), clock.clone()).with_progress_cap(512);
    substrate.init().await.unwrap();
    std::fs::write(substrate.path(DocKind::Progress), "").unwrap();

    let mut expected = String::new();
    for i in 0..60 {
        let line = substrate
            .append(DocKind::Progress, "EGO", &format!("entry number {i:04}"))
            .await
            .unwrap();
        expected.push_str(&line);
        expected.push('\n');
        clock.advance(Duration::from_secs(1));
    }

    // Several generations rotated out
    let mut rotated: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("PROGRESS.md.") && n.ends_with(".rotated"))
        .collect();
    assert!(rotated.len() >= 2, "expected multiple rotations: {rotated:?}");

    // Timestamped names sort chronologically
    rotated.sort();
    let mut reassembled = String::new();
    for name in &rotated {
        reassembled.push_str(&std::fs::read_to_string(dir.path().join(name)).unwrap());
    }
    reassembled.push_str(
        &std::fs::read_to_string(substrate.path(DocKind::Progress)).unwrap(),
    );

    assert_eq!(reassembled, expected);

    // Live file stays under the cap
    let live = std::fs::metadata(substrate.path(DocKind::Progress)).unwrap().len();
    assert!(live < 512);

    // Every line still matches the entry shape
    for line in reassembled.lines() {
        assert!(line.starts_with('['), "bad line: {line}");
        assert!(line.contains("] [EGO] "), "bad line: {line}");
    }
}
