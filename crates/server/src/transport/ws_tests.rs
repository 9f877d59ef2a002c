// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upgrade-path tests over a real TCP listener. Frame-level behavior is
//! covered by the session tests; here we check that authentication and
//! container lookup gate the upgrade itself.

use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite;

use crate::test_support::{make_app_state, AnyhowExt};
use crate::transport::build_router;

async fn serve(state: std::sync::Arc<crate::state::AppState>) -> anyhow::Result<String> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(addr.to_string())
}

fn http_status(err: tungstenite::Error) -> Option<u16> {
    match err {
        tungstenite::Error::Http(response) => Some(response.status().as_u16()),
        _ => None,
    }
}

#[tokio::test]
async fn upgrade_without_token_is_rejected_before_any_frame() -> anyhow::Result<()> {
    let state = make_app_state()?;
    let addr = serve(state).await?;

    let err = match connect_async(format!("ws://{addr}/api/ws/terminal/1")).await {
        Ok(_) => anyhow::bail!("unauthenticated upgrade succeeded"),
        Err(err) => err,
    };
    assert_eq!(http_status(err), Some(401));
    Ok(())
}

#[tokio::test]
async fn upgrade_with_garbage_token_is_rejected() -> anyhow::Result<()> {
    let state = make_app_state()?;
    let addr = serve(state).await?;

    let err = match connect_async(format!("ws://{addr}/api/ws/terminal/1?token=junk")).await {
        Ok(_) => anyhow::bail!("forged token accepted"),
        Err(err) => err,
    };
    assert_eq!(http_status(err), Some(401));
    Ok(())
}

#[tokio::test]
async fn upgrade_requires_a_known_container() -> anyhow::Result<()> {
    let state = make_app_state()?;
    let token = state.tokens.issue("admin")?.token;
    let addr = serve(state).await?;

    let err = match connect_async(format!("ws://{addr}/api/ws/terminal/42?token={token}")).await
    {
        Ok(_) => anyhow::bail!("upgrade succeeded for unknown container"),
        Err(err) => err,
    };
    assert_eq!(http_status(err), Some(404));
    Ok(())
}

#[tokio::test]
async fn upgrade_requires_a_runtime_handle() -> anyhow::Result<()> {
    let state = make_app_state()?;
    let token = state.tokens.issue("admin")?.token;
    // A record that was never realized by the runtime.
    let id = state.store.insert_container(
        "ghost",
        "img",
        None,
        &Default::default(),
        &Default::default(),
        Some(1 << 30),
        Some(100_000),
        Some(100_000),
        Some(256),
    )?;
    let addr = serve(state).await?;

    let err =
        match connect_async(format!("ws://{addr}/api/ws/terminal/{id}?token={token}")).await {
            Ok(_) => anyhow::bail!("upgrade succeeded without a runtime handle"),
            Err(err) => err,
        };
    assert_eq!(http_status(err), Some(422));
    Ok(())
}

#[test]
fn query_defaults() -> anyhow::Result<()> {
    let query: super::WsQuery = serde_json::from_str("{}").anyhow()?;
    assert!(query.token.is_none());
    assert!(query.session.is_none());
    assert!(query.cols.is_none());
    Ok(())
}
