// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed catalog. Source of truth for containers, monitoring
//! configuration, tasks, automation logs, and terminal session metadata.
//! Transient PTY buffers stay in memory; reconcile-on-startup resolves
//! drift against the container runtime.

mod automation;
mod containers;
mod monitoring;
mod profiles;
mod settings;
mod tasks;
mod terminal;

pub use automation::AutomationEntry;
pub use containers::{ContainerRecord, ContainerStatus};
pub use tasks::{TaskRecord, TaskState};
pub use terminal::SessionRow;

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;

/// Shared SQLite store. The connection is guarded by a mutex; all methods
/// keep their critical sections short and never await while holding it.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database and bring the schema up to date.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("creating database directory")?;
            }
        }
        let conn = Connection::open(path).context("opening database")?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory database")?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    /// Run a closure with the locked connection.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<T> {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                r#"
                PRAGMA journal_mode = WAL;
                PRAGMA foreign_keys = ON;

                CREATE TABLE IF NOT EXISTS schema_migrations (
                  version INTEGER PRIMARY KEY,
                  applied_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS users (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  username TEXT NOT NULL UNIQUE,
                  password_hash TEXT NOT NULL,
                  salt TEXT NOT NULL,
                  created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS settings (
                  key TEXT PRIMARY KEY,
                  ciphertext TEXT NOT NULL,
                  nonce TEXT NOT NULL,
                  updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS repositories (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  url TEXT NOT NULL,
                  name TEXT NOT NULL,
                  default_branch TEXT,
                  created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS containers (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  runtime_id TEXT,
                  name TEXT NOT NULL UNIQUE,
                  image TEXT NOT NULL,
                  status TEXT NOT NULL,
                  orphaned INTEGER NOT NULL DEFAULT 0,
                  repo_url TEXT,
                  labels TEXT NOT NULL DEFAULT '{}',
                  ports TEXT NOT NULL DEFAULT '{}',
                  memory_limit INTEGER,
                  cpu_quota INTEGER,
                  cpu_period INTEGER,
                  pids_limit INTEGER,
                  created_at TEXT NOT NULL,
                  started_at TEXT,
                  stopped_at TEXT
                );

                CREATE TABLE IF NOT EXISTS monitoring_configs (
                  container_id INTEGER PRIMARY KEY,
                  enabled INTEGER NOT NULL DEFAULT 0,
                  silence_threshold INTEGER NOT NULL,
                  strategy TEXT NOT NULL,
                  config TEXT NOT NULL DEFAULT '{}',
                  buffer_size INTEGER NOT NULL DEFAULT 8192,
                  updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS tasks (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  container_id INTEGER NOT NULL,
                  command TEXT NOT NULL,
                  state TEXT NOT NULL DEFAULT 'pending',
                  enqueued_at TEXT NOT NULL,
                  started_at TEXT,
                  completed_at TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_tasks_container
                  ON tasks(container_id, state);

                CREATE TABLE IF NOT EXISTS automation_logs (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  container_id INTEGER NOT NULL,
                  fired_at TEXT NOT NULL,
                  strategy TEXT NOT NULL,
                  action TEXT NOT NULL,
                  command TEXT,
                  message TEXT,
                  success INTEGER NOT NULL,
                  error TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_automation_container
                  ON automation_logs(container_id, fired_at);

                CREATE TABLE IF NOT EXISTS terminal_sessions (
                  id TEXT PRIMARY KEY,
                  container_id INTEGER NOT NULL,
                  cols INTEGER NOT NULL,
                  rows INTEGER NOT NULL,
                  created_at TEXT NOT NULL,
                  last_active TEXT NOT NULL,
                  closed_at TEXT
                );

                CREATE TABLE IF NOT EXISTS terminal_history (
                  session_id TEXT PRIMARY KEY,
                  data BLOB NOT NULL,
                  saved_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS conversations (
                  id TEXT PRIMARY KEY,
                  container_id INTEGER,
                  created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS turns (
                  id TEXT PRIMARY KEY,
                  conversation_id TEXT NOT NULL,
                  role TEXT NOT NULL,
                  content TEXT,
                  created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS events (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  turn_id TEXT,
                  kind TEXT NOT NULL,
                  payload TEXT,
                  created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS github_tokens (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  name TEXT NOT NULL UNIQUE,
                  ciphertext TEXT NOT NULL,
                  nonce TEXT NOT NULL,
                  created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS env_profiles (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  name TEXT NOT NULL UNIQUE,
                  content TEXT NOT NULL,
                  created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS startup_profiles (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  name TEXT NOT NULL UNIQUE,
                  command TEXT NOT NULL,
                  created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS config_templates (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  name TEXT NOT NULL UNIQUE,
                  content TEXT NOT NULL,
                  created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS migration_flags (
                  name TEXT PRIMARY KEY,
                  applied_at TEXT NOT NULL
                );

                INSERT OR IGNORE INTO schema_migrations (version, applied_at)
                  VALUES (1, datetime('now'));
                "#,
            )
        })
        .context("initializing schema")?;
        Ok(())
    }
}

/// RFC 3339 timestamp for `now`.
pub(crate) fn now_ts() -> String {
    Utc::now().to_rfc3339()
}

/// Parse a stored RFC 3339 timestamp.
pub(crate) fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
