// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::Serialize;

use super::{now_ts, parse_ts, Store};

/// Append-only record of one strategy firing.
#[derive(Debug, Clone, Serialize)]
pub struct AutomationEntry {
    pub id: i64,
    pub container_id: i64,
    pub fired_at: Option<DateTime<Utc>>,
    pub strategy: String,
    pub action: String,
    pub command: Option<String>,
    pub message: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<AutomationEntry> {
    let fired_at: String = row.get("fired_at")?;
    Ok(AutomationEntry {
        id: row.get("id")?,
        container_id: row.get("container_id")?,
        fired_at: parse_ts(&fired_at),
        strategy: row.get("strategy")?,
        action: row.get("action")?,
        command: row.get("command")?,
        message: row.get("message")?,
        success: row.get::<_, i64>("success")? != 0,
        error: row.get("error")?,
    })
}

impl Store {
    /// Append one firing result. Single transaction per append.
    #[allow(clippy::too_many_arguments)]
    pub fn append_automation(
        &self,
        container_id: i64,
        strategy: &str,
        action: &str,
        command: Option<&str>,
        message: Option<&str>,
        success: bool,
        error: Option<&str>,
    ) -> rusqlite::Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO automation_logs
                   (container_id, fired_at, strategy, action, command, message, success, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![container_id, now_ts(), strategy, action, command, message,
                        success as i64, error],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn list_automation(
        &self,
        container_id: i64,
        limit: usize,
    ) -> rusqlite::Result<Vec<AutomationEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, container_id, fired_at, strategy, action, command, message,
                        success, error
                 FROM automation_logs WHERE container_id = ?1
                 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![container_id, limit as i64], row_to_entry)?;
            rows.collect()
        })
    }
}
