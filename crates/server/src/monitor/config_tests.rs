// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn injection_cfg(threshold: u64) -> MonitoringConfig {
    MonitoringConfig {
        enabled: true,
        silence_threshold: threshold,
        strategy: StrategyTag::Injection,
        webhook: None,
        injection: Some(InjectionConfig { command: Some("ls".to_owned()) }),
        queue: None,
        ai: None,
        buffer_size: DEFAULT_BUFFER_SIZE,
    }
}

#[yare::parameterized(
    lower_bound    = { 5, true },
    upper_bound    = { 300, true },
    middle         = { 60, true },
    below          = { 4, false },
    above          = { 301, false },
    zero           = { 0, false },
)]
fn threshold_bounds(threshold: u64, should_pass: bool) {
    let cfg = injection_cfg(threshold);
    assert_eq!(cfg.validate().is_ok(), should_pass, "threshold {threshold}");
}

#[test]
fn webhook_requires_url() {
    let mut cfg = injection_cfg(30);
    cfg.strategy = StrategyTag::Webhook;
    assert!(cfg.validate().is_err());

    cfg.webhook = Some(WebhookConfig {
        url: "ftp://example.com".to_owned(),
        headers: Default::default(),
    });
    assert!(cfg.validate().is_err());

    cfg.webhook = Some(WebhookConfig {
        url: "https://example.com/hook".to_owned(),
        headers: Default::default(),
    });
    assert!(cfg.validate().is_ok());
}

#[test]
fn zero_buffer_rejected() {
    let mut cfg = injection_cfg(30);
    cfg.buffer_size = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn serde_defaults_fill_optional_fields() -> anyhow::Result<()> {
    let cfg: MonitoringConfig = serde_json::from_str(
        r#"{"silence_threshold": 30, "strategy": "injection"}"#,
    )?;
    assert!(!cfg.enabled);
    assert_eq!(cfg.buffer_size, DEFAULT_BUFFER_SIZE);
    assert!(cfg.injection.is_none());
    cfg.validate().map_err(|e| anyhow::anyhow!(e))
}

#[test]
fn strategy_tags_round_trip() -> anyhow::Result<()> {
    for (tag, text) in [
        (StrategyTag::Webhook, "\"webhook\""),
        (StrategyTag::Injection, "\"injection\""),
        (StrategyTag::Queue, "\"queue\""),
        (StrategyTag::Ai, "\"ai\""),
    ] {
        assert_eq!(serde_json::to_string(&tag)?, text);
        assert_eq!(serde_json::from_str::<StrategyTag>(text)?, tag);
    }
    Ok(())
}

#[test]
fn ai_defaults() -> anyhow::Result<()> {
    let cfg: AiConfig = serde_json::from_str("{}")?;
    assert_eq!(cfg.timeout_secs, 30);
    assert_eq!(cfg.max_tokens, 512);
    assert_eq!(cfg.default_action, DefaultAction::Skip);
    assert!(cfg.endpoint.is_empty());
    Ok(())
}
