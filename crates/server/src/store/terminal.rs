// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{now_ts, parse_ts, Store};

/// Persisted terminal session metadata.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRow {
    pub id: String,
    pub container_id: i64,
    pub cols: u16,
    pub rows: u16,
    pub created_at: Option<DateTime<Utc>>,
    pub last_active: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<SessionRow> {
    let created_at: String = row.get("created_at")?;
    let last_active: String = row.get("last_active")?;
    let closed_at: Option<String> = row.get("closed_at")?;
    Ok(SessionRow {
        id: row.get("id")?,
        container_id: row.get("container_id")?,
        cols: row.get::<_, i64>("cols")? as u16,
        rows: row.get::<_, i64>("rows")? as u16,
        created_at: parse_ts(&created_at),
        last_active: parse_ts(&last_active),
        closed_at: closed_at.as_deref().and_then(parse_ts),
    })
}

impl Store {
    pub fn upsert_terminal_session(
        &self,
        id: &str,
        container_id: i64,
        cols: u16,
        rows: u16,
    ) -> rusqlite::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO terminal_sessions
                   (id, container_id, cols, rows, created_at, last_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                   cols = excluded.cols,
                   rows = excluded.rows,
                   last_active = excluded.last_active,
                   closed_at = NULL",
                params![id, container_id, cols as i64, rows as i64, now_ts()],
            )?;
            Ok(())
        })
    }

    /// Mark a session closed and persist its final history snapshot.
    pub fn close_terminal_session(&self, id: &str, history: &[u8]) -> rusqlite::Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let ts = now_ts();
            tx.execute(
                "UPDATE terminal_sessions SET closed_at = ?1 WHERE id = ?2",
                params![ts, id],
            )?;
            tx.execute(
                "INSERT INTO terminal_history (session_id, data, saved_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id) DO UPDATE SET
                   data = excluded.data,
                   saved_at = excluded.saved_at",
                params![id, history, ts],
            )?;
            tx.commit()
        })
    }

    pub fn get_terminal_history(&self, id: &str) -> rusqlite::Result<Option<Vec<u8>>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT data FROM terminal_history WHERE session_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub fn list_terminal_sessions(
        &self,
        container_id: i64,
    ) -> rusqlite::Result<Vec<SessionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, container_id, cols, rows, created_at, last_active, closed_at
                 FROM terminal_sessions WHERE container_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt.query_map(params![container_id], row_to_session)?;
            rows.collect()
        })
    }
}
