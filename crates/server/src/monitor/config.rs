// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Bounds on the silence threshold, inclusive.
pub const MIN_SILENCE_SECS: u64 = 5;
pub const MAX_SILENCE_SECS: u64 = 300;

/// Default context buffer capacity in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Which strategy a monitoring session dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyTag {
    Webhook,
    Injection,
    Queue,
    Ai,
}

impl StrategyTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Injection => "injection",
            Self::Queue => "queue",
            Self::Ai => "ai",
        }
    }
}

impl std::fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-container monitoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Seconds of PTY silence before the strategy fires.
    pub silence_threshold: u64,
    pub strategy: StrategyTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injection: Option<InjectionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai: Option<AiConfig>,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

impl MonitoringConfig {
    /// Validate threshold bounds and the selected strategy's sub-config.
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_SILENCE_SECS..=MAX_SILENCE_SECS).contains(&self.silence_threshold) {
            return Err(format!(
                "silence threshold must be within [{MIN_SILENCE_SECS}, {MAX_SILENCE_SECS}] seconds, got {}",
                self.silence_threshold
            ));
        }
        if self.buffer_size == 0 {
            return Err("context buffer size must be non-zero".to_owned());
        }
        match self.strategy {
            StrategyTag::Webhook => match &self.webhook {
                Some(cfg) if cfg.url.starts_with("http://") || cfg.url.starts_with("https://") => {
                    Ok(())
                }
                Some(_) => Err("webhook url must be http(s)".to_owned()),
                None => Err("webhook strategy requires a webhook config".to_owned()),
            },
            // An injection strategy without a command is allowed and skips.
            StrategyTag::Injection => Ok(()),
            StrategyTag::Queue => Ok(()),
            // An AI strategy without an endpoint is allowed and falls back
            // to its default action.
            StrategyTag::Ai => Ok(()),
        }
    }
}

/// Webhook strategy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Injection strategy settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InjectionConfig {
    #[serde(default)]
    pub command: Option<String>,
}

/// Queue strategy settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue identifier, informational.
    #[serde(default)]
    pub id: Option<String>,
    /// Message broadcast when no task is pending.
    #[serde(default)]
    pub empty_message: Option<String>,
}

/// Fallback actions the AI strategy may resolve to on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DefaultAction {
    #[default]
    Skip,
    Notify,
    Complete,
}

/// AI strategy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub default_action: DefaultAction,
}

fn default_ai_timeout() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    512
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
