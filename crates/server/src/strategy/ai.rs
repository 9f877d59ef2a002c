// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LLM-backed strategy: sends the recent context to a chat-completion
//! endpoint and applies the model's JSON decision. Anything that goes
//! wrong — unconfigured client, transport error, malformed output — falls
//! back to the configured default action.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{FiringContext, Strategy, StrategyAction, StrategyResult};
use crate::monitor::config::{AiConfig, DefaultAction, MonitoringConfig, StrategyTag};

/// At most this much of the context buffer goes into the prompt.
const MAX_PROMPT_CONTEXT: usize = 4096;

const DEFAULT_SYSTEM_PROMPT: &str = "You supervise an automated coding session. \
The user message contains recent terminal output from a container whose session \
has gone silent. Decide what to do next and answer with a single JSON object: \
{\"action\": \"inject\" | \"skip\" | \"notify\" | \"complete\", \
\"command\": \"shell command when action is inject\", \
\"message\": \"short explanation\"}. Answer with the JSON object only.";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Decision {
    action: Option<String>,
    command: Option<String>,
    message: Option<String>,
}

/// Chat-completion strategy.
pub struct AiStrategy {
    client: reqwest::Client,
}

impl AiStrategy {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    async fn ask(&self, cfg: &AiConfig, ctx: &FiringContext) -> anyhow::Result<StrategyResult> {
        let context_tail = tail_chars(&ctx.context, MAX_PROMPT_CONTEXT);
        let user_prompt = format!(
            "Recent terminal output:\n{}\n\nThe terminal has been silent for {} seconds.",
            context_tail, ctx.silence_secs
        );

        let mut body = serde_json::json!({
            "model": cfg.model,
            "messages": [
                {
                    "role": "system",
                    "content": cfg.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT),
                },
                { "role": "user", "content": user_prompt },
            ],
            "max_tokens": cfg.max_tokens,
        });
        if let Some(temperature) = cfg.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        let response = self
            .client
            .post(&cfg.endpoint)
            .bearer_auth(&cfg.api_key)
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await?;

        let content = response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();
        let object = first_json_object(content)
            .ok_or_else(|| anyhow::anyhow!("no JSON object in model output"))?;
        let decision: Decision = serde_json::from_str(object)?;

        let action = decision
            .action
            .as_deref()
            .and_then(normalize_action)
            .ok_or_else(|| anyhow::anyhow!("model returned no usable action"))?;

        Ok(match action {
            StrategyAction::Inject => match decision.command {
                Some(command) if !command.trim().is_empty() => StrategyResult::inject(command),
                _ => StrategyResult::skip(),
            },
            StrategyAction::Notify => StrategyResult::notify(
                decision.message.unwrap_or_else(|| "model requested a notification".to_owned()),
            ),
            StrategyAction::Complete => StrategyResult::complete(),
            _ => StrategyResult::skip(),
        })
    }
}

impl Default for AiStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Strategy for AiStrategy {
    fn name(&self) -> StrategyTag {
        StrategyTag::Ai
    }

    fn validate(&self, cfg: &MonitoringConfig) -> Result<(), String> {
        if let Some(ai) = &cfg.ai {
            if !ai.endpoint.is_empty()
                && !ai.endpoint.starts_with("http://")
                && !ai.endpoint.starts_with("https://")
            {
                return Err("ai endpoint must be http(s)".to_owned());
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: &FiringContext) -> anyhow::Result<StrategyResult> {
        let Some(ai) = ctx.config.ai.clone() else {
            return Ok(fallback(DefaultAction::Skip));
        };
        if ai.endpoint.is_empty() {
            return Ok(fallback(ai.default_action));
        }

        match self.ask(&ai, ctx).await {
            Ok(result) => Ok(result),
            Err(e) => {
                debug!(container = ctx.container_id, err = %e,
                    "ai strategy failed, using default action");
                Ok(fallback(ai.default_action))
            }
        }
    }
}

fn fallback(action: DefaultAction) -> StrategyResult {
    match action {
        DefaultAction::Skip => StrategyResult::skip(),
        DefaultAction::Notify => StrategyResult::notify("session is silent"),
        DefaultAction::Complete => StrategyResult::complete(),
    }
}

/// Accept common lexical variants of the action names.
fn normalize_action(raw: &str) -> Option<StrategyAction> {
    match raw.trim().to_lowercase().as_str() {
        "inject" | "injection" | "run" | "execute" | "command" => Some(StrategyAction::Inject),
        "notify" | "notification" | "message" | "alert" => Some(StrategyAction::Notify),
        "skip" | "none" | "wait" | "ignore" => Some(StrategyAction::Skip),
        "complete" | "completed" | "done" | "finish" | "finished" => {
            Some(StrategyAction::Complete)
        }
        _ => None,
    }
}

/// Locate the first balanced JSON object in free-form model output,
/// respecting string literals and escapes.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Last `max` characters of `text`, on a char boundary.
fn tail_chars(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
#[path = "ai_tests.rs"]
mod tests;
