// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JWT issue/verify for REST sessions.
//!
//! HS256 tokens carrying the session's public key as `sub` and a `jti`
//! used for revocation on disconnect. Revocations are tracked by the
//! relay state until the token's own expiry passes.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a relay REST token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The session's public key (hex).
    pub sub: String,
    /// Expiry, seconds since epoch.
    pub exp: u64,
    /// Issued-at, seconds since epoch.
    pub iat: u64,
    /// Token id for revocation.
    pub jti: String,
}

/// An issued token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at_ms: u64,
}

/// Sign a token for `public_key`, valid for `expiry_secs`.
pub fn issue(
    secret: &str,
    public_key: &str,
    now_ms: u64,
    expiry_secs: u64,
) -> Result<IssuedToken, jsonwebtoken::errors::Error> {
    let iat = now_ms / 1000;
    let exp = iat + expiry_secs;
    let jti = uuid::Uuid::new_v4().to_string();

    let claims = Claims {
        sub: public_key.to_string(),
        exp,
        iat,
        jti: jti.clone(),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(IssuedToken {
        token,
        jti,
        expires_at_ms: exp * 1000,
    })
}

/// Decode and validate a token's signature and expiry.
///
/// Expiry is checked against `now_ms` rather than the library's wall
/// clock so the whole relay runs on one injected clock.
pub fn verify(secret: &str, token: &str, now_ms: u64) -> Result<Claims, crate::RelayError> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry is validated manually against the injected clock
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| crate::RelayError::Unauthorized)?;

    if data.claims.exp * 1000 <= now_ms {
        return Err(crate::RelayError::Unauthorized);
    }
    Ok(data.claims)
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
