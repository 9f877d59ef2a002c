// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;

use super::{FiringContext, Strategy, StrategyResult};
use crate::monitor::config::{MonitoringConfig, StrategyTag};

/// Emits the configured command on every firing; skips when none is set.
pub struct InjectionStrategy;

#[async_trait]
impl Strategy for InjectionStrategy {
    fn name(&self) -> StrategyTag {
        StrategyTag::Injection
    }

    fn validate(&self, _cfg: &MonitoringConfig) -> Result<(), String> {
        Ok(())
    }

    async fn execute(&self, ctx: &FiringContext) -> anyhow::Result<StrategyResult> {
        let command = ctx
            .config
            .injection
            .as_ref()
            .and_then(|i| i.command.clone())
            .filter(|c| !c.trim().is_empty());
        Ok(match command {
            Some(command) => StrategyResult::inject(command),
            None => StrategyResult::skip(),
        })
    }
}

#[cfg(test)]
#[path = "inject_tests.rs"]
mod tests;
