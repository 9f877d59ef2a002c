// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{now_ts, parse_ts, Store};

/// Lifecycle of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A queued command for one container.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: i64,
    pub container_id: i64,
    pub command: String,
    pub state: TaskState,
    pub enqueued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let state: String = row.get("state")?;
    let enqueued_at: String = row.get("enqueued_at")?;
    let started_at: Option<String> = row.get("started_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    Ok(TaskRecord {
        id: row.get("id")?,
        container_id: row.get("container_id")?,
        command: row.get("command")?,
        state: TaskState::parse(&state).unwrap_or(TaskState::Pending),
        enqueued_at: parse_ts(&enqueued_at),
        started_at: started_at.as_deref().and_then(parse_ts),
        completed_at: completed_at.as_deref().and_then(parse_ts),
    })
}

const TASK_COLS: &str =
    "id, container_id, command, state, enqueued_at, started_at, completed_at";

impl Store {
    pub fn enqueue_task(&self, container_id: i64, command: &str) -> rusqlite::Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (container_id, command, state, enqueued_at)
                 VALUES (?1, ?2, 'pending', ?3)",
                params![container_id, command, now_ts()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Dequeue the oldest pending task for a container and mark it running.
    /// FIFO: ordered by enqueue rowid, not timestamp, so same-millisecond
    /// inserts keep their order.
    pub fn dequeue_task(&self, container_id: i64) -> rusqlite::Result<Option<TaskRecord>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let task = tx
                .query_row(
                    &format!(
                        "SELECT {TASK_COLS} FROM tasks
                         WHERE container_id = ?1 AND state = 'pending'
                         ORDER BY id LIMIT 1"
                    ),
                    params![container_id],
                    row_to_task,
                )
                .optional()?;
            if let Some(ref task) = task {
                tx.execute(
                    "UPDATE tasks SET state = 'running', started_at = ?1 WHERE id = ?2",
                    params![now_ts(), task.id],
                )?;
            }
            tx.commit()?;
            Ok(task.map(|t| TaskRecord { state: TaskState::Running, ..t }))
        })
    }

    /// Mark every running task for a container completed. Called on the
    /// monitor's next idle transition after an injection.
    pub fn complete_running_tasks(&self, container_id: i64) -> rusqlite::Result<usize> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE tasks SET state = 'completed', completed_at = ?1
                 WHERE container_id = ?2 AND state = 'running'",
                params![now_ts(), container_id],
            )
        })
    }

    pub fn fail_task(&self, id: i64) -> rusqlite::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE tasks SET state = 'failed', completed_at = ?1 WHERE id = ?2",
                params![now_ts(), id],
            )?;
            Ok(())
        })
    }

    pub fn list_tasks(&self, container_id: i64) -> rusqlite::Result<Vec<TaskRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLS} FROM tasks WHERE container_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![container_id], row_to_task)?;
            rows.collect()
        })
    }

    pub fn delete_task(&self, id: i64) -> rusqlite::Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
            Ok(n > 0)
        })
    }
}
