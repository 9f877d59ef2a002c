// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Profile tables (github tokens, env vars, startup commands, config
//! templates) and the one-time migration from legacy single-config rows.

use rusqlite::{params, OptionalExtension};
use tracing::info;

use super::{now_ts, Store};
use crate::crypto::{Cipher, Sealed};

/// Flag row guarding the legacy single-config → profiles migration.
const LEGACY_FLAG: &str = "legacy_profiles";

/// Legacy settings keys consumed by the migration.
const LEGACY_GITHUB_TOKEN: &str = "github_token";
const LEGACY_CUSTOM_ENV: &str = "custom_env";
const LEGACY_STARTUP_COMMAND: &str = "startup_command";
const LEGACY_CLAUDE_CONFIG: &str = "claude_config";

/// Name given to profiles created by the migration.
const MIGRATED_PROFILE: &str = "default";

impl Store {
    pub fn migration_flag(&self, name: &str) -> rusqlite::Result<bool> {
        self.with_conn(|conn| {
            let row: Option<String> = conn
                .query_row(
                    "SELECT applied_at FROM migration_flags WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(row.is_some())
        })
    }

    /// Move legacy single-config rows into the profile tables.
    ///
    /// Guarded by a flag row written in the same transaction as the copied
    /// data, so a crash mid-migration re-runs cleanly and a completed
    /// migration never repeats.
    pub fn run_legacy_migration(&self, cipher: &Cipher) -> anyhow::Result<()> {
        if self.migration_flag(LEGACY_FLAG)? {
            return Ok(());
        }

        // Decrypt the plaintext-bearing legacy rows up front; the token row
        // is moved sealed, without a decrypt round-trip.
        let token: Option<Sealed> = self.get_setting_sealed(LEGACY_GITHUB_TOKEN)?;
        let env = self.get_setting(cipher, LEGACY_CUSTOM_ENV)?;
        let startup = self.get_setting(cipher, LEGACY_STARTUP_COMMAND)?;
        let template = self.get_setting(cipher, LEGACY_CLAUDE_CONFIG)?;

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let ts = now_ts();
            if let Some(sealed) = token {
                tx.execute(
                    "INSERT OR IGNORE INTO github_tokens (name, ciphertext, nonce, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![MIGRATED_PROFILE, sealed.ciphertext, sealed.nonce, ts],
                )?;
            }
            if let Some(content) = env {
                tx.execute(
                    "INSERT OR IGNORE INTO env_profiles (name, content, created_at)
                     VALUES (?1, ?2, ?3)",
                    params![MIGRATED_PROFILE, content, ts],
                )?;
            }
            if let Some(command) = startup {
                tx.execute(
                    "INSERT OR IGNORE INTO startup_profiles (name, command, created_at)
                     VALUES (?1, ?2, ?3)",
                    params![MIGRATED_PROFILE, command, ts],
                )?;
            }
            if let Some(content) = template {
                tx.execute(
                    "INSERT OR IGNORE INTO config_templates (name, content, created_at)
                     VALUES (?1, ?2, ?3)",
                    params![MIGRATED_PROFILE, content, ts],
                )?;
            }
            tx.execute(
                "INSERT INTO migration_flags (name, applied_at) VALUES (?1, ?2)",
                params![LEGACY_FLAG, ts],
            )?;
            tx.commit()
        })?;

        info!("migrated legacy configuration rows into profile tables");
        Ok(())
    }

    pub fn put_env_profile(&self, name: &str, content: &str) -> rusqlite::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO env_profiles (name, content, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET content = excluded.content",
                params![name, content, now_ts()],
            )?;
            Ok(())
        })
    }

    pub fn get_env_profile(&self, name: &str) -> rusqlite::Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT content FROM env_profiles WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub fn put_startup_profile(&self, name: &str, command: &str) -> rusqlite::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO startup_profiles (name, command, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET command = excluded.command",
                params![name, command, now_ts()],
            )?;
            Ok(())
        })
    }

    pub fn get_startup_profile(&self, name: &str) -> rusqlite::Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT command FROM startup_profiles WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
        })
    }
}
