// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable silence-reaction strategies. A closed set of variants behind
//! one trait; the engine maps tags to instances, serializes executions per
//! container, and bounds each call with a deadline.

pub mod ai;
pub mod inject;
pub mod queue;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::monitor::config::{MonitoringConfig, StrategyTag};
use crate::store::Store;

/// What a strategy decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyAction {
    Inject,
    Notify,
    Skip,
    Complete,
    Error,
}

impl StrategyAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inject => "inject",
            Self::Notify => "notify",
            Self::Skip => "skip",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

/// One firing's outcome.
#[derive(Debug, Clone)]
pub struct StrategyResult {
    pub action: StrategyAction,
    pub command: Option<String>,
    pub message: Option<String>,
}

impl StrategyResult {
    pub fn skip() -> Self {
        Self { action: StrategyAction::Skip, command: None, message: None }
    }

    pub fn inject(command: impl Into<String>) -> Self {
        Self { action: StrategyAction::Inject, command: Some(command.into()), message: None }
    }

    pub fn notify(message: impl Into<String>) -> Self {
        Self { action: StrategyAction::Notify, command: None, message: Some(message.into()) }
    }

    pub fn complete() -> Self {
        Self { action: StrategyAction::Complete, command: None, message: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { action: StrategyAction::Error, command: None, message: Some(message.into()) }
    }

    pub fn success(&self) -> bool {
        self.action != StrategyAction::Error
    }
}

/// Snapshot handed to a strategy when the monitor fires.
pub struct FiringContext {
    pub container_id: i64,
    pub config: MonitoringConfig,
    /// Recent PTY output, lossy UTF-8.
    pub context: String,
    /// Seconds of observed silence at firing time.
    pub silence_secs: u64,
    pub store: Arc<Store>,
}

/// A silence-reaction strategy.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> StrategyTag;
    /// Check the strategy-specific part of a monitoring config.
    fn validate(&self, cfg: &MonitoringConfig) -> Result<(), String>;
    async fn execute(&self, ctx: &FiringContext) -> anyhow::Result<StrategyResult>;
}

/// Engine holding the registered strategies.
///
/// Exactly one strategy runs per firing; executions for the same container
/// are serialized behind a per-container lock, while different containers
/// proceed in parallel.
pub struct StrategyEngine {
    strategies: HashMap<StrategyTag, Arc<dyn Strategy>>,
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl StrategyEngine {
    pub fn new() -> Self {
        let mut strategies: HashMap<StrategyTag, Arc<dyn Strategy>> = HashMap::new();
        strategies.insert(StrategyTag::Webhook, Arc::new(webhook::WebhookStrategy::new()));
        strategies.insert(StrategyTag::Injection, Arc::new(inject::InjectionStrategy));
        strategies.insert(StrategyTag::Queue, Arc::new(queue::QueueStrategy));
        strategies.insert(StrategyTag::Ai, Arc::new(ai::AiStrategy::new()));
        Self { strategies, locks: Mutex::new(HashMap::new()) }
    }

    /// Validate the strategy-specific part of a config.
    pub fn validate(&self, cfg: &MonitoringConfig) -> Result<(), String> {
        match self.strategies.get(&cfg.strategy) {
            Some(strategy) => strategy.validate(cfg),
            None => Err(format!("unknown strategy: {}", cfg.strategy)),
        }
    }

    /// Run the configured strategy with a deadline, serialized per container.
    /// Never panics out: timeouts, cancellation, and strategy errors all
    /// come back as an `error` result.
    pub async fn execute(&self, ctx: &FiringContext, deadline: Duration) -> StrategyResult {
        let Some(strategy) = self.strategies.get(&ctx.config.strategy).cloned() else {
            return StrategyResult::error(format!("unknown strategy: {}", ctx.config.strategy));
        };

        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(ctx.container_id).or_default())
        };
        let _serialized = lock.lock().await;

        match tokio::time::timeout(deadline, strategy.execute(ctx)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => StrategyResult::error(format!("strategy failed: {e:#}")),
            Err(_) => StrategyResult::error(format!(
                "strategy exceeded its {}s deadline",
                deadline.as_secs()
            )),
        }
    }
}

impl Default for StrategyEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
