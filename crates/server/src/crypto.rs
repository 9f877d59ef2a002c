// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AES-256-GCM encryption for sensitive settings at rest.
//!
//! Key material is derived from `ENCRYPTION_KEY` via SHA-256. Every
//! plaintext gets a fresh random nonce; ciphertext and nonce are stored
//! base64-encoded.

use anyhow::{anyhow, Context};
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Encrypted value as stored: base64 ciphertext+tag and base64 nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: String,
    pub nonce: String,
}

/// AES-256-GCM cipher bound to a derived key.
pub struct Cipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl Cipher {
    /// Derive a cipher from arbitrary key material.
    pub fn new(key_material: &str) -> anyhow::Result<Self> {
        let derived = digest(&SHA256, key_material.as_bytes());
        let unbound = UnboundKey::new(&AES_256_GCM, derived.as_ref())
            .map_err(|_| anyhow!("failed to build AES-256-GCM key"))?;
        Ok(Self { key: LessSafeKey::new(unbound), rng: SystemRandom::new() })
    }

    /// Encrypt a plaintext under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> anyhow::Result<Sealed> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| anyhow!("nonce generation failed"))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| anyhow!("encryption failed"))?;

        Ok(Sealed {
            ciphertext: B64.encode(&in_out),
            nonce: B64.encode(nonce_bytes),
        })
    }

    /// Decrypt a stored value.
    pub fn decrypt(&self, sealed: &Sealed) -> anyhow::Result<Vec<u8>> {
        let nonce_bytes: [u8; NONCE_LEN] = B64
            .decode(&sealed.nonce)
            .context("invalid nonce encoding")?
            .try_into()
            .map_err(|_| anyhow!("invalid nonce length"))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = B64.decode(&sealed.ciphertext).context("invalid ciphertext encoding")?;
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| anyhow!("decryption failed"))?;
        Ok(plaintext.to_vec())
    }

    /// Encrypt a UTF-8 string.
    pub fn encrypt_str(&self, plaintext: &str) -> anyhow::Result<Sealed> {
        self.encrypt(plaintext.as_bytes())
    }

    /// Decrypt to a UTF-8 string.
    pub fn decrypt_str(&self, sealed: &Sealed) -> anyhow::Result<String> {
        let bytes = self.decrypt(sealed)?;
        String::from_utf8(bytes).context("decrypted value is not UTF-8")
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cipher(aes-256-gcm)")
    }
}

#[cfg(test)]
#[path = "crypto_tests.rs"]
mod tests;
