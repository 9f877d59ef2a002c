// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token authentication: admin credential check, JWT issue/verify,
//! and logout revocation.

use std::collections::HashSet;
use std::num::NonZeroU32;

use anyhow::Context;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use parking_lot::RwLock;
use ring::pbkdf2;
use serde::{Deserialize, Serialize};

/// Token lifetime in seconds.
const TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

const PBKDF2_ITERATIONS: u32 = 100_000;

/// Constant-time string comparison to prevent timing side-channel attacks.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// PBKDF2-HMAC-SHA256 password hash.
pub fn hash_password(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password.as_bytes(),
        &mut out,
    );
    out
}

/// Verify a password against a stored hash.
pub fn verify_password(password: &str, salt: &[u8], expected: &[u8]) -> bool {
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN);
    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password.as_bytes(),
        expected,
    )
    .is_ok()
}

/// JWT claims carried by every issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// An issued token with its expiry.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
}

/// The admin credential the login endpoint checks against.
pub struct AdminCredential {
    username: String,
    salt: [u8; 16],
    hash: [u8; 32],
}

impl AdminCredential {
    pub fn new(username: &str, password: &str) -> Self {
        let mut salt = [0u8; 16];
        rand::RngCore::fill_bytes(&mut rand::rng(), &mut salt);
        let hash = hash_password(password, &salt);
        Self { username: username.to_owned(), salt, hash }
    }

    /// Check a login attempt. Username compare is constant-time; the
    /// password goes through PBKDF2 verification regardless of whether the
    /// username matched, so failures are uniform.
    pub fn check(&self, username: &str, password: &str) -> bool {
        let user_ok = constant_time_eq(username, &self.username);
        let pass_ok = verify_password(password, &self.salt, &self.hash);
        user_ok && pass_ok
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

/// Issues and verifies bearer tokens; tracks revoked token ids for logout.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    revoked: RwLock<HashSet<String>>,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            revoked: RwLock::new(HashSet::new()),
        }
    }

    /// Issue a token for the given principal.
    pub fn issue(&self, username: &str) -> anyhow::Result<IssuedToken> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: username.to_owned(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };
        let token =
            encode(&Header::default(), &claims, &self.encoding).context("token encoding")?;
        Ok(IssuedToken { token, expires_at: claims.exp })
    }

    /// Verify a token: signature, expiry, and revocation.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default()).ok()?;
        if self.revoked.read().contains(&data.claims.jti) {
            return None;
        }
        Some(data.claims)
    }

    /// Revoke a token (logout). Returns false for tokens that never
    /// verified in the first place.
    pub fn revoke(&self, token: &str) -> bool {
        match self.verify(token) {
            Some(claims) => {
                self.revoked.write().insert(claims.jti);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
