// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use super::*;
use crate::monitor::config::{MonitoringConfig, StrategyTag, WebhookConfig};
use crate::store::Store;
use crate::strategy::{Strategy, StrategyAction};

struct Stub {
    /// Attempts observed so far.
    hits: AtomicUsize,
    /// Fail this many attempts with a 500 before succeeding.
    fail_first: usize,
    reply: serde_json::Value,
}

async fn stub_handler(
    State(stub): State<Arc<Stub>>,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    use axum::response::IntoResponse;
    assert!(body.get("container_id").is_some());
    assert!(body.get("context_buffer").is_some());
    assert!(body.get("fired_at").is_some());

    let n = stub.hits.fetch_add(1, Ordering::SeqCst);
    if n < stub.fail_first {
        (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
    } else {
        Json(stub.reply.clone()).into_response()
    }
}

async fn spawn_stub(fail_first: usize, reply: serde_json::Value) -> anyhow::Result<(String, Arc<Stub>)> {
    let stub = Arc::new(Stub { hits: AtomicUsize::new(0), fail_first, reply });
    let router = Router::new()
        .route("/hook", post(stub_handler))
        .with_state(Arc::clone(&stub));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((format!("http://{addr}/hook"), stub))
}

fn ctx(url: &str) -> anyhow::Result<FiringContext> {
    Ok(FiringContext {
        container_id: 7,
        config: MonitoringConfig {
            enabled: true,
            silence_threshold: 30,
            strategy: StrategyTag::Webhook,
            webhook: Some(WebhookConfig { url: url.to_owned(), headers: Default::default() }),
            injection: None,
            queue: None,
            ai: None,
            buffer_size: 8192,
        },
        context: "recent output".to_owned(),
        silence_secs: 30,
        store: Arc::new(Store::open_in_memory()?),
    })
}

#[tokio::test]
async fn retries_then_applies_notify_reply() -> anyhow::Result<()> {
    // Two 500s, then a 200 with a notify action.
    let (url, stub) =
        spawn_stub(2, serde_json::json!({"action": "notify", "message": "hi"})).await?;

    let result = WebhookStrategy::new().execute(&ctx(&url)?).await?;
    assert_eq!(stub.hits.load(Ordering::SeqCst), 3);
    assert_eq!(result.action, StrategyAction::Notify);
    assert_eq!(result.message.as_deref(), Some("hi"));
    Ok(())
}

#[tokio::test]
async fn gives_up_after_three_attempts() -> anyhow::Result<()> {
    let (url, stub) = spawn_stub(10, serde_json::json!({})).await?;

    let result = WebhookStrategy::new().execute(&ctx(&url)?).await;
    assert_eq!(stub.hits.load(Ordering::SeqCst), 3);
    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn inject_reply_carries_command() -> anyhow::Result<()> {
    let (url, _stub) =
        spawn_stub(0, serde_json::json!({"action": "inject", "command": "make test"})).await?;

    let result = WebhookStrategy::new().execute(&ctx(&url)?).await?;
    assert_eq!(result.action, StrategyAction::Inject);
    assert_eq!(result.command.as_deref(), Some("make test"));
    Ok(())
}

#[tokio::test]
async fn empty_reply_body_skips() -> anyhow::Result<()> {
    let (url, _stub) = spawn_stub(0, serde_json::json!({})).await?;
    let result = WebhookStrategy::new().execute(&ctx(&url)?).await?;
    assert_eq!(result.action, StrategyAction::Skip);
    Ok(())
}

#[test]
fn validate_requires_http_url() {
    let strategy = WebhookStrategy::new();
    let mut cfg = match ctx("https://example.com/hook") {
        Ok(c) => c.config,
        Err(_) => return,
    };
    assert!(strategy.validate(&cfg).is_ok());
    cfg.webhook = None;
    assert!(strategy.validate(&cfg).is_err());
}
