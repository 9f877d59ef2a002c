// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{now_ts, parse_ts, Store};

/// Catalog status of a container. Mirrors the last observed runtime status;
/// a record whose handle disappeared is flagged orphaned instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Stopped,
    Removed,
}

impl ContainerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Removed => "removed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(Self::Created),
            "running" => Some(Self::Running),
            "stopped" => Some(Self::Stopped),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted container record.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerRecord {
    pub id: i64,
    pub runtime_id: Option<String>,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub orphaned: bool,
    pub repo_url: Option<String>,
    pub labels: HashMap<String, String>,
    /// Container port → allocated host port.
    pub ports: HashMap<u16, u16>,
    pub memory_limit: Option<i64>,
    pub cpu_quota: Option<i64>,
    pub cpu_period: Option<i64>,
    pub pids_limit: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ContainerRecord> {
    let status: String = row.get("status")?;
    let labels: String = row.get("labels")?;
    let ports: String = row.get("ports")?;
    let created_at: String = row.get("created_at")?;
    let started_at: Option<String> = row.get("started_at")?;
    let stopped_at: Option<String> = row.get("stopped_at")?;
    Ok(ContainerRecord {
        id: row.get("id")?,
        runtime_id: row.get("runtime_id")?,
        name: row.get("name")?,
        image: row.get("image")?,
        status: ContainerStatus::parse(&status).unwrap_or(ContainerStatus::Created),
        orphaned: row.get::<_, i64>("orphaned")? != 0,
        repo_url: row.get("repo_url")?,
        labels: serde_json::from_str(&labels).unwrap_or_default(),
        ports: serde_json::from_str(&ports).unwrap_or_default(),
        memory_limit: row.get("memory_limit")?,
        cpu_quota: row.get("cpu_quota")?,
        cpu_period: row.get("cpu_period")?,
        pids_limit: row.get("pids_limit")?,
        created_at: parse_ts(&created_at),
        started_at: started_at.as_deref().and_then(parse_ts),
        stopped_at: stopped_at.as_deref().and_then(parse_ts),
    })
}

const SELECT_COLS: &str = "id, runtime_id, name, image, status, orphaned, repo_url, labels, \
     ports, memory_limit, cpu_quota, cpu_period, pids_limit, created_at, started_at, stopped_at";

impl Store {
    /// Insert a new container record; returns its id.
    pub fn insert_container(
        &self,
        name: &str,
        image: &str,
        repo_url: Option<&str>,
        labels: &HashMap<String, String>,
        ports: &HashMap<u16, u16>,
        memory_limit: Option<i64>,
        cpu_quota: Option<i64>,
        cpu_period: Option<i64>,
        pids_limit: Option<i64>,
    ) -> rusqlite::Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO containers
                   (name, image, status, repo_url, labels, ports,
                    memory_limit, cpu_quota, cpu_period, pids_limit, created_at)
                 VALUES (?1, ?2, 'created', ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    name,
                    image,
                    repo_url,
                    serde_json::to_string(labels).unwrap_or_else(|_| "{}".to_owned()),
                    serde_json::to_string(ports).unwrap_or_else(|_| "{}".to_owned()),
                    memory_limit,
                    cpu_quota,
                    cpu_period,
                    pids_limit,
                    now_ts(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Attach the runtime handle produced by the container runtime.
    pub fn set_container_runtime_id(&self, id: i64, runtime_id: &str) -> rusqlite::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE containers SET runtime_id = ?1 WHERE id = ?2",
                params![runtime_id, id],
            )?;
            Ok(())
        })
    }

    pub fn get_container(&self, id: i64) -> rusqlite::Result<Option<ContainerRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {SELECT_COLS} FROM containers WHERE id = ?1"),
                params![id],
                row_to_record,
            )
            .optional()
        })
    }

    pub fn get_container_by_name(&self, name: &str) -> rusqlite::Result<Option<ContainerRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {SELECT_COLS} FROM containers WHERE name = ?1"),
                params![name],
                row_to_record,
            )
            .optional()
        })
    }

    /// List all records, orphaned ones included. API listings filter.
    pub fn list_containers(&self) -> rusqlite::Result<Vec<ContainerRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {SELECT_COLS} FROM containers ORDER BY id"))?;
            let rows = stmt.query_map([], row_to_record)?;
            rows.collect()
        })
    }

    /// List records visible to API callers: not orphaned, not removed.
    pub fn list_active_containers(&self) -> rusqlite::Result<Vec<ContainerRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLS} FROM containers
                 WHERE orphaned = 0 AND status != 'removed' ORDER BY id"
            ))?;
            let rows = stmt.query_map([], row_to_record)?;
            rows.collect()
        })
    }

    /// Update status, maintaining the start/stop timestamps.
    pub fn set_container_status(
        &self,
        id: i64,
        status: ContainerStatus,
    ) -> rusqlite::Result<()> {
        self.with_conn(|conn| {
            match status {
                ContainerStatus::Running => conn.execute(
                    "UPDATE containers
                     SET status = ?1, orphaned = 0, started_at = ?2 WHERE id = ?3",
                    params![status.as_str(), now_ts(), id],
                )?,
                ContainerStatus::Stopped => conn.execute(
                    "UPDATE containers SET status = ?1, stopped_at = ?2 WHERE id = ?3",
                    params![status.as_str(), now_ts(), id],
                )?,
                _ => conn.execute(
                    "UPDATE containers SET status = ?1 WHERE id = ?2",
                    params![status.as_str(), id],
                )?,
            };
            Ok(())
        })
    }

    /// Flag a record whose runtime handle vanished. Orphaned records are
    /// excluded from listings until reconciliation re-adopts them.
    pub fn set_container_orphaned(&self, id: i64, orphaned: bool) -> rusqlite::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE containers SET orphaned = ?1 WHERE id = ?2",
                params![orphaned as i64, id],
            )?;
            Ok(())
        })
    }

    /// Delete the record and its monitoring config. Idempotent.
    pub fn delete_container(&self, id: i64) -> rusqlite::Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM monitoring_configs WHERE container_id = ?1", params![id])?;
            tx.execute("DELETE FROM containers WHERE id = ?1", params![id])?;
            tx.commit()
        })
    }

    /// Host ports already allocated across all records.
    pub fn allocated_host_ports(&self) -> rusqlite::Result<Vec<u16>> {
        let records = self.list_containers()?;
        Ok(records.iter().flat_map(|r| r.ports.values().copied()).collect())
    }
}
