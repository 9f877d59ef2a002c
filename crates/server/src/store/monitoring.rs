// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rusqlite::{params, OptionalExtension};

use super::{now_ts, Store};
use crate::monitor::config::MonitoringConfig;

impl Store {
    /// Persist the monitoring configuration for a container. The full
    /// config is stored as JSON; hot columns are duplicated for queries.
    pub fn put_monitoring_config(
        &self,
        container_id: i64,
        cfg: &MonitoringConfig,
    ) -> rusqlite::Result<()> {
        let json = serde_json::to_string(cfg).unwrap_or_else(|_| "{}".to_owned());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO monitoring_configs
                   (container_id, enabled, silence_threshold, strategy, config,
                    buffer_size, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(container_id) DO UPDATE SET
                   enabled = excluded.enabled,
                   silence_threshold = excluded.silence_threshold,
                   strategy = excluded.strategy,
                   config = excluded.config,
                   buffer_size = excluded.buffer_size,
                   updated_at = excluded.updated_at",
                params![
                    container_id,
                    cfg.enabled as i64,
                    cfg.silence_threshold as i64,
                    cfg.strategy.as_str(),
                    json,
                    cfg.buffer_size as i64,
                    now_ts(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_monitoring_config(
        &self,
        container_id: i64,
    ) -> rusqlite::Result<Option<MonitoringConfig>> {
        let json: Option<String> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT config FROM monitoring_configs WHERE container_id = ?1",
                params![container_id],
                |row| row.get(0),
            )
            .optional()
        })?;
        Ok(json.and_then(|j| serde_json::from_str(&j).ok()))
    }

    pub fn delete_monitoring_config(&self, container_id: i64) -> rusqlite::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM monitoring_configs WHERE container_id = ?1",
                params![container_id],
            )?;
            Ok(())
        })
    }
}
