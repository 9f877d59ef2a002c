// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;

use super::{FiringContext, Strategy, StrategyResult};
use crate::monitor::config::{MonitoringConfig, StrategyTag};

/// Dequeues one pending task (FIFO per container) and injects its command.
/// The task is marked running here; the monitor marks it completed on the
/// next idle transition.
pub struct QueueStrategy;

#[async_trait]
impl Strategy for QueueStrategy {
    fn name(&self) -> StrategyTag {
        StrategyTag::Queue
    }

    fn validate(&self, _cfg: &MonitoringConfig) -> Result<(), String> {
        Ok(())
    }

    async fn execute(&self, ctx: &FiringContext) -> anyhow::Result<StrategyResult> {
        let task = ctx.store.dequeue_task(ctx.container_id)?;
        Ok(match task {
            Some(task) => StrategyResult::inject(task.command),
            None => {
                let message = ctx
                    .config
                    .queue
                    .as_ref()
                    .and_then(|q| q.empty_message.clone())
                    .unwrap_or_else(|| "task queue is empty".to_owned());
                StrategyResult::notify(message)
            }
        })
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
