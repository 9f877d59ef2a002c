// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rusqlite::{params, OptionalExtension};

use super::{now_ts, Store};
use crate::crypto::{Cipher, Sealed};

impl Store {
    /// Store an encrypted setting.
    pub fn put_setting(
        &self,
        cipher: &Cipher,
        key: &str,
        value: &str,
    ) -> anyhow::Result<()> {
        let sealed = cipher.encrypt_str(value)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (key, ciphertext, nonce, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                   ciphertext = excluded.ciphertext,
                   nonce = excluded.nonce,
                   updated_at = excluded.updated_at",
                params![key, sealed.ciphertext, sealed.nonce, now_ts()],
            )?;
            Ok(())
        })?;
        Ok(())
    }

    /// Fetch and decrypt a setting.
    pub fn get_setting(&self, cipher: &Cipher, key: &str) -> anyhow::Result<Option<String>> {
        let sealed = self.get_setting_sealed(key)?;
        match sealed {
            Some(sealed) => Ok(Some(cipher.decrypt_str(&sealed)?)),
            None => Ok(None),
        }
    }

    /// Fetch a setting without decrypting (used by the legacy migration to
    /// move github tokens ciphertext-to-ciphertext).
    pub fn get_setting_sealed(&self, key: &str) -> rusqlite::Result<Option<Sealed>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT ciphertext, nonce FROM settings WHERE key = ?1",
                params![key],
                |row| {
                    Ok(Sealed { ciphertext: row.get(0)?, nonce: row.get(1)? })
                },
            )
            .optional()
        })
    }

    pub fn delete_setting(&self, key: &str) -> rusqlite::Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
            Ok(())
        })
    }

    /// Create the admin user row if absent.
    pub fn ensure_user(
        &self,
        username: &str,
        password_hash: &str,
        salt: &str,
    ) -> rusqlite::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users (username, password_hash, salt, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![username, password_hash, salt, now_ts()],
            )?;
            Ok(())
        })
    }
}
