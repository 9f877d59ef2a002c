// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-container monitoring: watches PTY output, detects silence, and
//! dispatches to the configured strategy. `on_output` is synchronous and
//! never blocks the PTY fan-out loop; everything else runs on the
//! container's monitor task.

pub mod config;
mod session;

pub use config::{MonitoringConfig, StrategyTag};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::ApiError;
use crate::ring::ByteRing;
use crate::sessions::WriteBack;
use crate::store::Store;
use crate::strategy::StrategyEngine;

/// State machine phase of an active monitoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorPhase {
    /// Enabled, timer armed from enable time, no output yet.
    Idle,
    /// Output observed, timer re-armed from the last byte.
    Armed,
    /// Strategy executing.
    Firing,
    /// Post-firing cooldown before re-arming.
    Cooling,
}

impl MonitorPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Firing => "firing",
            Self::Cooling => "cooling",
        }
    }
}

/// Hot state shared between the PTY fan-out loop and the monitor task.
pub(crate) struct MonitorShared {
    pub inner: parking_lot::Mutex<MonitorInner>,
    pub output_seen: tokio::sync::Notify,
}

pub(crate) struct MonitorInner {
    pub ring: ByteRing,
    pub last_output: tokio::time::Instant,
    pub last_output_ms: Option<u64>,
    pub phase: MonitorPhase,
}

/// Status surfaced over the API.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub enabled: bool,
    pub active: bool,
    pub state: String,
    pub strategy: Option<StrategyTag>,
    pub silence_threshold: Option<u64>,
    pub last_output_at: Option<DateTime<Utc>>,
    pub silence_secs: Option<u64>,
}

struct MonitorEntry {
    shared: Arc<MonitorShared>,
    cancel: CancellationToken,
}

/// Map of live monitoring sessions, shared with the session tasks so a
/// task that escalates to disabled can release its own slot.
pub(crate) type ActiveMap = Arc<parking_lot::RwLock<HashMap<i64, Arc<MonitorShared>>>>;

/// Owns one monitoring session per enabled container.
pub struct MonitorManager {
    store: Arc<Store>,
    engine: Arc<StrategyEngine>,
    /// Hot path: read lock + short inner mutex, callable from sync code.
    active: ActiveMap,
    entries: tokio::sync::Mutex<HashMap<i64, MonitorEntry>>,
    bindings: tokio::sync::Mutex<HashMap<i64, WriteBack>>,
}

impl MonitorManager {
    pub fn new(store: Arc<Store>, engine: Arc<StrategyEngine>) -> Self {
        Self {
            store,
            engine,
            active: Arc::new(parking_lot::RwLock::new(HashMap::new())),
            entries: tokio::sync::Mutex::new(HashMap::new()),
            bindings: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Validate and persist a configuration; (re)start the session when the
    /// container has an attached PTY.
    pub async fn enable(&self, container_id: i64, cfg: MonitoringConfig) -> Result<(), ApiError> {
        cfg.validate().map_err(ApiError::validation)?;
        self.engine.validate(&cfg).map_err(ApiError::validation)?;
        self.store
            .put_monitoring_config(container_id, &cfg)
            .map_err(ApiError::from)?;

        self.stop_session(container_id).await;
        if cfg.enabled {
            let binding = self.bindings.lock().await.get(&container_id).cloned();
            if let Some(write_back) = binding {
                self.start_session(container_id, cfg, write_back).await;
            }
        }
        Ok(())
    }

    /// Same contract as enable; updates re-validate and restart.
    pub async fn update(&self, container_id: i64, cfg: MonitoringConfig) -> Result<(), ApiError> {
        self.enable(container_id, cfg).await
    }

    /// Persist enabled=false and stop the session.
    pub async fn disable(&self, container_id: i64) -> Result<(), ApiError> {
        if let Some(mut cfg) = self
            .store
            .get_monitoring_config(container_id)
            .map_err(ApiError::from)?
        {
            cfg.enabled = false;
            self.store
                .put_monitoring_config(container_id, &cfg)
                .map_err(ApiError::from)?;
        }
        self.stop_session(container_id).await;
        Ok(())
    }

    pub async fn status(&self, container_id: i64) -> Result<MonitorStatus, ApiError> {
        let cfg = self
            .store
            .get_monitoring_config(container_id)
            .map_err(ApiError::from)?;
        let shared = self.active.read().get(&container_id).cloned();

        let (state, last_output_at, silence_secs) = match &shared {
            Some(shared) => {
                let inner = shared.inner.lock();
                let last_at = inner.last_output_ms.and_then(|ms| {
                    chrono::TimeZone::timestamp_millis_opt(&Utc, ms as i64).single()
                });
                (
                    inner.phase.as_str().to_owned(),
                    last_at,
                    Some(inner.last_output.elapsed().as_secs()),
                )
            }
            None => ("disabled".to_owned(), None, None),
        };

        Ok(MonitorStatus {
            enabled: cfg.as_ref().map(|c| c.enabled).unwrap_or(false),
            active: shared.is_some(),
            state,
            strategy: cfg.as_ref().map(|c| c.strategy),
            silence_threshold: cfg.as_ref().map(|c| c.silence_threshold),
            last_output_at,
            silence_secs,
        })
    }

    /// Fork of the PTY output stream. Synchronous and non-blocking: ring
    /// write plus timestamp update under a short mutex.
    pub fn on_output(&self, container_id: i64, bytes: &[u8]) {
        let Some(shared) = self.active.read().get(&container_id).cloned() else {
            return;
        };
        {
            let mut inner = shared.inner.lock();
            inner.ring.write(bytes);
            inner.last_output = tokio::time::Instant::now();
            inner.last_output_ms = Some(crate::sessions::epoch_ms());
            if matches!(inner.phase, MonitorPhase::Idle | MonitorPhase::Armed) {
                inner.phase = MonitorPhase::Armed;
            }
        }
        shared.output_seen.notify_waiters();
    }

    /// Current context buffer contents, lossy UTF-8.
    pub fn context_buffer(&self, container_id: i64) -> String {
        match self.active.read().get(&container_id) {
            Some(shared) => {
                String::from_utf8_lossy(&shared.inner.lock().ring.snapshot()).into_owned()
            }
            None => String::new(),
        }
    }

    /// A PTY session came up for this container; remember the write-back
    /// handle and start monitoring when the stored config says so.
    pub async fn bind_session(&self, container_id: i64, write_back: WriteBack) {
        self.bindings.lock().await.insert(container_id, write_back.clone());
        let enabled_cfg = self
            .store
            .get_monitoring_config(container_id)
            .ok()
            .flatten()
            .filter(|c| c.enabled);
        if let Some(cfg) = enabled_cfg {
            self.start_session(container_id, cfg, write_back).await;
        }
    }

    /// The container's PTY closed; the monitoring session dies with it.
    pub async fn on_session_closed(&self, container_id: i64) {
        self.bindings.lock().await.remove(&container_id);
        self.stop_session(container_id).await;
    }

    async fn start_session(
        &self,
        container_id: i64,
        cfg: MonitoringConfig,
        write_back: WriteBack,
    ) {
        self.stop_session(container_id).await;

        let shared = Arc::new(MonitorShared {
            inner: parking_lot::Mutex::new(MonitorInner {
                ring: ByteRing::new(cfg.buffer_size),
                last_output: tokio::time::Instant::now(),
                last_output_ms: None,
                phase: MonitorPhase::Idle,
            }),
            output_seen: tokio::sync::Notify::new(),
        });
        let cancel = CancellationToken::new();

        self.active.write().insert(container_id, Arc::clone(&shared));
        self.entries.lock().await.insert(
            container_id,
            MonitorEntry { shared: Arc::clone(&shared), cancel: cancel.clone() },
        );

        info!(container = container_id, strategy = %cfg.strategy,
            threshold = cfg.silence_threshold, "monitoring enabled");
        tokio::spawn(session::run_monitor(session::MonitorDeps {
            container_id,
            config: cfg,
            shared,
            write_back,
            store: Arc::clone(&self.store),
            engine: Arc::clone(&self.engine),
            active: Arc::clone(&self.active),
            cancel,
        }));
    }

    async fn stop_session(&self, container_id: i64) {
        self.active.write().remove(&container_id);
        if let Some(entry) = self.entries.lock().await.remove(&container_id) {
            entry.cancel.cancel();
            drop(entry.shared);
            info!(container = container_id, "monitoring stopped");
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
