// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const SECRET: &str = "test-secret";
const NOW_MS: u64 = 1_767_225_600_000;

#[test]
fn issue_then_verify() {
    let issued = issue(SECRET, "pubkey-hex", NOW_MS, 3600).unwrap();
    let claims = verify(SECRET, &issued.token, NOW_MS).unwrap();

    assert_eq!(claims.sub, "pubkey-hex");
    assert_eq!(claims.jti, issued.jti);
    assert_eq!(issued.expires_at_ms, NOW_MS + 3_600_000);
}

#[test]
fn wrong_secret_is_unauthorized() {
    let issued = issue(SECRET, "pubkey-hex", NOW_MS, 3600).unwrap();
    assert!(verify("other-secret", &issued.token, NOW_MS).is_err());
}

#[test]
fn expired_token_is_unauthorized() {
    let issued = issue(SECRET, "pubkey-hex", NOW_MS, 3600).unwrap();
    let after_expiry = NOW_MS + 3_600_001;
    assert!(verify(SECRET, &issued.token, after_expiry).is_err());
}

#[test]
fn garbage_token_is_unauthorized() {
    assert!(verify(SECRET, "not.a.jwt", NOW_MS).is_err());
}

#[test]
fn jti_is_unique_per_issue() {
    let a = issue(SECRET, "k", NOW_MS, 60).unwrap();
    let b = issue(SECRET, "k", NOW_MS, 60).unwrap();
    assert_ne!(a.jti, b.jti);
}
