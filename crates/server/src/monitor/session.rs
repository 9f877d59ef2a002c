// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-container monitor task: silence timer, strategy dispatch, result
//! recording, and error escalation.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{MonitorPhase, MonitorShared};
use crate::monitor::config::MonitoringConfig;
use crate::sessions::WriteBack;
use crate::store::Store;
use crate::strategy::{FiringContext, StrategyAction, StrategyEngine, StrategyResult};
use crate::transport::frames::ServerFrame;

/// Cooldown between a firing and the next armed timer.
const COOLDOWN: Duration = Duration::from_secs(2);
/// Error escalation: this many consecutive failures...
const ESCALATION_ERRORS: usize = 3;
/// ...within this window disable monitoring.
const ESCALATION_WINDOW: Duration = Duration::from_secs(60);

pub(crate) struct MonitorDeps {
    pub container_id: i64,
    pub config: MonitoringConfig,
    pub shared: Arc<MonitorShared>,
    pub write_back: WriteBack,
    pub store: Arc<Store>,
    pub engine: Arc<StrategyEngine>,
    pub active: super::ActiveMap,
    pub cancel: CancellationToken,
}

pub(crate) async fn run_monitor(deps: MonitorDeps) {
    let threshold = Duration::from_secs(deps.config.silence_threshold);
    let mut recent_errors: VecDeque<Instant> = VecDeque::new();

    loop {
        let (phase, last_output) = {
            let inner = deps.shared.inner.lock();
            (inner.phase, inner.last_output)
        };

        match phase {
            MonitorPhase::Idle | MonitorPhase::Armed => {
                let deadline = last_output + threshold;
                if Instant::now() >= deadline {
                    if !fire(&deps, &mut recent_errors, threshold).await {
                        break;
                    }
                    continue;
                }
                tokio::select! {
                    _ = deps.cancel.cancelled() => break,
                    // Output re-arms the timer; recompute on wake.
                    _ = deps.shared.output_seen.notified() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            MonitorPhase::Cooling => {
                tokio::select! {
                    _ = deps.cancel.cancelled() => break,
                    // Output during cooldown ends it early.
                    _ = deps.shared.output_seen.notified() => {}
                    _ = tokio::time::sleep(COOLDOWN) => {}
                }
                {
                    let mut inner = deps.shared.inner.lock();
                    if inner.phase == MonitorPhase::Cooling {
                        inner.phase = MonitorPhase::Idle;
                    }
                }
                // Idle transition: tasks injected by the queue strategy are
                // considered acknowledged now (best effort).
                if let Err(e) = deps.store.complete_running_tasks(deps.container_id) {
                    debug!(container = deps.container_id, err = %e,
                        "task completion update failed");
                }
            }
            // The timer loop is the only writer of Firing; seeing it here
            // means a stale read, treat as armed.
            MonitorPhase::Firing => {
                tokio::task::yield_now().await;
            }
        }
    }

    // Release this session's slot unless a newer session already took it.
    let mut active = deps.active.write();
    if active
        .get(&deps.container_id)
        .is_some_and(|shared| Arc::ptr_eq(shared, &deps.shared))
    {
        active.remove(&deps.container_id);
    }
}

/// Execute one firing. Returns false when the monitor must stop (cancelled
/// or escalated to disabled).
async fn fire(
    deps: &MonitorDeps,
    recent_errors: &mut VecDeque<Instant>,
    threshold: Duration,
) -> bool {
    let (context, silence_secs) = {
        let mut inner = deps.shared.inner.lock();
        inner.phase = MonitorPhase::Firing;
        (
            String::from_utf8_lossy(&inner.ring.snapshot()).into_owned(),
            inner.last_output.elapsed().as_secs(),
        )
    };

    let ctx = FiringContext {
        container_id: deps.container_id,
        config: deps.config.clone(),
        context,
        silence_secs,
        store: Arc::clone(&deps.store),
    };

    let result = tokio::select! {
        _ = deps.cancel.cancelled() => {
            // Cancellation is terminal for the in-flight execution.
            record(deps, &StrategyResult::error("execution cancelled")).await;
            return false;
        }
        result = deps.engine.execute(&ctx, threshold) => result,
    };

    let result = dispatch(deps, result).await;
    record(deps, &result).await;

    if !result.success() {
        let now = Instant::now();
        recent_errors.push_back(now);
        while recent_errors
            .front()
            .is_some_and(|t| now.duration_since(*t) > ESCALATION_WINDOW)
        {
            recent_errors.pop_front();
        }
        if recent_errors.len() >= ESCALATION_ERRORS {
            warn!(container = deps.container_id,
                "monitoring disabled after repeated strategy failures");
            if let Ok(Some(mut cfg)) = deps.store.get_monitoring_config(deps.container_id) {
                cfg.enabled = false;
                let _ = deps.store.put_monitoring_config(deps.container_id, &cfg);
            }
            let _ = deps
                .write_back
                .broadcast(ServerFrame::Notification {
                    message: "monitoring disabled after repeated strategy failures".to_owned(),
                    strategy: Some(deps.config.strategy.to_string()),
                    action: Some(StrategyAction::Error.as_str().to_owned()),
                })
                .await;
            deps.cancel.cancel();
            return false;
        }
    } else {
        recent_errors.clear();
    }

    // Firing → Cooling; the timer re-arms from now.
    {
        let mut inner = deps.shared.inner.lock();
        inner.phase = MonitorPhase::Cooling;
        inner.last_output = Instant::now();
    }
    true
}

/// Apply the strategy's decision through the write-back handle.
async fn dispatch(deps: &MonitorDeps, mut result: StrategyResult) -> StrategyResult {
    match result.action {
        StrategyAction::Inject => {
            let Some(mut command) = result.command.clone() else {
                return StrategyResult::skip();
            };
            if !command.ends_with('\n') {
                command.push('\n');
            }
            result.command = Some(command.clone());
            if !deps.write_back.write_bytes(command.into_bytes()).await {
                return StrategyResult::error("pty write-back failed");
            }
            result
        }
        StrategyAction::Notify | StrategyAction::Error => {
            let message = result
                .message
                .clone()
                .unwrap_or_else(|| "automation notification".to_owned());
            let _ = deps
                .write_back
                .broadcast(ServerFrame::Notification {
                    message,
                    strategy: Some(deps.config.strategy.to_string()),
                    action: Some(result.action.as_str().to_owned()),
                })
                .await;
            result
        }
        StrategyAction::Skip | StrategyAction::Complete => result,
    }
}

/// Append the firing outcome to the automation log.
async fn record(deps: &MonitorDeps, result: &StrategyResult) {
    if let Err(e) = deps.store.append_automation(
        deps.container_id,
        deps.config.strategy.as_str(),
        result.action.as_str(),
        result.command.as_deref(),
        result.message.as_deref(),
        result.success(),
        result
            .message
            .as_deref()
            .filter(|_| !result.success()),
    ) {
        warn!(container = deps.container_id, err = %e, "automation log append failed");
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
