// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use tracing::debug;

use super::{FiringContext, Strategy, StrategyResult};
use crate::monitor::config::{MonitoringConfig, StrategyTag};

/// Maximum delivery attempts per firing.
const MAX_ATTEMPTS: u32 = 3;
/// Base backoff, doubled per attempt and jittered.
const BACKOFF_BASE_MS: u64 = 250;

/// What a webhook endpoint may answer with.
#[derive(Debug, Deserialize)]
struct WebhookReply {
    action: Option<String>,
    command: Option<String>,
    message: Option<String>,
}

/// POSTs the firing context to a configured URL and applies the reply.
pub struct WebhookStrategy {
    client: reqwest::Client,
}

impl WebhookStrategy {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for WebhookStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Strategy for WebhookStrategy {
    fn name(&self) -> StrategyTag {
        StrategyTag::Webhook
    }

    fn validate(&self, cfg: &MonitoringConfig) -> Result<(), String> {
        match &cfg.webhook {
            Some(webhook)
                if webhook.url.starts_with("http://") || webhook.url.starts_with("https://") =>
            {
                Ok(())
            }
            Some(_) => Err("webhook url must be http(s)".to_owned()),
            None => Err("webhook strategy requires a webhook config".to_owned()),
        }
    }

    async fn execute(&self, ctx: &FiringContext) -> anyhow::Result<StrategyResult> {
        let Some(webhook) = ctx.config.webhook.clone() else {
            anyhow::bail!("webhook config missing");
        };

        let body = serde_json::json!({
            "container_id": ctx.container_id,
            "context_buffer": ctx.context,
            "fired_at": Utc::now().to_rfc3339(),
        });

        let mut last_err = String::new();
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let base = BACKOFF_BASE_MS * (1u64 << (attempt - 1));
                let jitter = rand::rng().random_range(0..BACKOFF_BASE_MS / 2);
                tokio::time::sleep(std::time::Duration::from_millis(base + jitter)).await;
            }

            let mut request = self.client.post(&webhook.url).json(&body);
            for (name, value) in &webhook.headers {
                request = request.header(name, value);
            }

            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let reply: Option<WebhookReply> = resp.json().await.ok();
                    return Ok(apply_reply(reply));
                }
                Ok(resp) => {
                    last_err = format!("webhook returned {}", resp.status());
                    debug!(attempt, status = %resp.status(), "webhook attempt failed");
                }
                Err(e) => {
                    last_err = format!("webhook request failed: {e}");
                    debug!(attempt, err = %e, "webhook attempt failed");
                }
            }
        }

        anyhow::bail!("{last_err} after {MAX_ATTEMPTS} attempts");
    }
}

fn apply_reply(reply: Option<WebhookReply>) -> StrategyResult {
    let Some(reply) = reply else {
        return StrategyResult::skip();
    };
    match reply.action.as_deref() {
        Some("inject") => match reply.command {
            Some(command) => StrategyResult::inject(command),
            None => StrategyResult::skip(),
        },
        Some("notify") => {
            StrategyResult::notify(reply.message.unwrap_or_else(|| "webhook fired".to_owned()))
        }
        Some("skip") | None => StrategyResult::skip(),
        Some(other) => StrategyResult::error(format!("webhook returned unknown action: {other}")),
    }
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;
