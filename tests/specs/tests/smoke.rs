// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests against the real `berth` binary. Tests that need
//! a Docker daemon (and the workspace image) are `#[ignore]`d; everything
//! else runs against the catalog-only surface.

use std::time::Duration;

use berth::transport::frames::ServerFrame;
use berth_specs::{BerthProcess, ADMIN_USER};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

const TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::test]
async fn login_issues_a_usable_token() -> anyhow::Result<()> {
    let berth = BerthProcess::start()?;
    berth.wait_ready(TIMEOUT).await?;

    let token = berth.login().await?;
    let client = reqwest::Client::new();
    let containers: serde_json::Value = client
        .get(format!("{}/api/containers", berth.base_url()))
        .bearer_auth(&token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    assert_eq!(containers, serde_json::json!([]));
    Ok(())
}

#[tokio::test]
async fn wrong_credentials_get_401_and_no_token() -> anyhow::Result<()> {
    let berth = BerthProcess::start()?;
    berth.wait_ready(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/auth/login", berth.base_url()))
        .json(&serde_json::json!({"username": ADMIN_USER, "password": "nope"}))
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 401);
    let body: serde_json::Value = response.json().await?;
    assert!(body.get("token").is_none());
    Ok(())
}

#[tokio::test]
async fn protected_surface_rejects_missing_token() -> anyhow::Result<()> {
    let berth = BerthProcess::start()?;
    berth.wait_ready(TIMEOUT).await?;

    let client = reqwest::Client::new();
    for path in ["/api/containers", "/api/terminals/1/sessions", "/api/monitoring/1/status"] {
        let response = client
            .get(format!("{}{path}", berth.base_url()))
            .send()
            .await?;
        assert_eq!(response.status().as_u16(), 401, "path {path}");
    }
    Ok(())
}

#[tokio::test]
async fn websocket_upgrade_authenticates_from_query() -> anyhow::Result<()> {
    let berth = BerthProcess::start()?;
    berth.wait_ready(TIMEOUT).await?;

    // No token: rejected before any frame.
    let err = match tokio_tungstenite::connect_async(berth.ws_url("/api/ws/terminal/1")).await {
        Ok(_) => anyhow::bail!("unauthenticated upgrade succeeded"),
        Err(err) => err,
    };
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status().as_u16(), 401),
        other => anyhow::bail!("expected HTTP 401, got {other:?}"),
    }

    // Valid token, unknown container: 404 after auth.
    let token = berth.login().await?;
    let err = match tokio_tungstenite::connect_async(
        berth.ws_url(&format!("/api/ws/terminal/1?token={token}")),
    )
    .await
    {
        Ok(_) => anyhow::bail!("upgrade succeeded for unknown container"),
        Err(err) => err,
    };
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status().as_u16(), 404),
        other => anyhow::bail!("expected HTTP 404, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn policy_violations_rejected_without_a_runtime() -> anyhow::Result<()> {
    let berth = BerthProcess::start()?;
    berth.wait_ready(TIMEOUT).await?;
    let token = berth.login().await?;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/containers", berth.base_url()))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "name": "evil",
            "mounts": [{"source": "/var/run/docker.sock", "target": "/sock"}],
        }))
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 422);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "POLICY_VIOLATION");
    Ok(())
}

// -- Docker-backed scenarios --------------------------------------------------
//
// These need a local Docker daemon and a pullable shell image. Run with
// `cargo test -p berth-specs -- --ignored`.

/// Create a container, attach two terminal clients to one session, and
/// check min-dimension sizing plus shared output.
#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn terminal_round_trip_with_two_clients() -> anyhow::Result<()> {
    let berth = BerthProcess::start()?;
    berth.wait_ready(TIMEOUT).await?;
    let token = berth.login().await?;
    let client = reqwest::Client::new();

    let created: serde_json::Value = client
        .post(format!("{}/api/containers", berth.base_url()))
        .bearer_auth(&token)
        .json(&serde_json::json!({"name": "demo", "image": "debian:bookworm-slim"}))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let id = created["id"].as_i64().ok_or_else(|| anyhow::anyhow!("no id"))?;

    client
        .post(format!("{}/api/containers/{id}/start", berth.base_url()))
        .bearer_auth(&token)
        .send()
        .await?
        .error_for_status()?;

    let url = berth.ws_url(&format!(
        "/api/ws/terminal/{id}?token={token}&session=s1&cols=80&rows=24"
    ));
    let (mut ws_a, _) = tokio_tungstenite::connect_async(&url).await?;
    let url_b = berth.ws_url(&format!(
        "/api/ws/terminal/{id}?token={token}&session=s1&cols=100&rows=30"
    ));
    let (mut ws_b, _) = tokio_tungstenite::connect_async(&url_b).await?;

    ws_a.send(tungstenite::Message::Text(
        serde_json::json!({"type": "input", "data": "echo spec-marker\n"})
            .to_string()
            .into(),
    ))
    .await?;

    // Both clients observe the echo in the same byte order.
    for ws in [&mut ws_a, &mut ws_b] {
        let mut seen = String::new();
        let deadline = tokio::time::Instant::now() + TIMEOUT;
        while !seen.contains("spec-marker") {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("echo never arrived: {seen}");
            }
            if let Some(Ok(tungstenite::Message::Text(text))) = ws.next().await {
                if let Ok(ServerFrame::Output { data, binary: false }) =
                    serde_json::from_str::<ServerFrame>(&text)
                {
                    seen.push_str(&data);
                }
            }
        }
    }

    // The session list reports the shared PTY at the minimum dimensions.
    let sessions: serde_json::Value = client
        .get(format!("{}/api/terminals/{id}/sessions", berth.base_url()))
        .bearer_auth(&token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    assert_eq!(sessions[0]["client_count"], 2);
    assert_eq!(sessions[0]["width"], 80);
    assert_eq!(sessions[0]["height"], 24);
    Ok(())
}

/// Remove a managed container behind the control plane's back and verify
/// reconciliation orphans the record and hides it from listings.
#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn reconciliation_orphans_externally_removed_containers() -> anyhow::Result<()> {
    let berth = BerthProcess::start()?;
    berth.wait_ready(TIMEOUT).await?;
    let token = berth.login().await?;
    let client = reqwest::Client::new();

    let created: serde_json::Value = client
        .post(format!("{}/api/containers", berth.base_url()))
        .bearer_auth(&token)
        .json(&serde_json::json!({"name": "doomed", "image": "debian:bookworm-slim"}))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let id = created["id"].as_i64().ok_or_else(|| anyhow::anyhow!("no id"))?;

    // Remove the runtime container directly, bypassing the API.
    let status = std::process::Command::new("docker")
        .args(["rm", "-f", "berth-doomed"])
        .status()?;
    anyhow::ensure!(status.success(), "docker rm failed");

    // Status inspection observes the missing handle and orphans the record.
    let response = client
        .get(format!("{}/api/containers/{id}/status", berth.base_url()))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 404);

    let listing: serde_json::Value = client
        .get(format!("{}/api/containers", berth.base_url()))
        .bearer_auth(&token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let listed = listing
        .as_array()
        .map(|a| a.iter().any(|c| c["id"] == id))
        .unwrap_or(false);
    assert!(!listed, "orphaned record still listed: {listing}");
    Ok(())
}

/// Enable injection monitoring with a 5 s threshold and verify the command
/// lands on the PTY after quiescence.
#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn silence_injection_fires_on_live_container() -> anyhow::Result<()> {
    let berth = BerthProcess::start()?;
    berth.wait_ready(TIMEOUT).await?;
    let token = berth.login().await?;
    let client = reqwest::Client::new();

    let created: serde_json::Value = client
        .post(format!("{}/api/containers", berth.base_url()))
        .bearer_auth(&token)
        .json(&serde_json::json!({"name": "demo", "image": "debian:bookworm-slim"}))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let id = created["id"].as_i64().ok_or_else(|| anyhow::anyhow!("no id"))?;

    client
        .put(format!("{}/api/monitoring/{id}/config", berth.base_url()))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "enabled": true,
            "silence_threshold": 5,
            "strategy": "injection",
            "injection": {"command": "ls"},
        }))
        .send()
        .await?
        .error_for_status()?;

    let url = berth.ws_url(&format!("/api/ws/terminal/{id}?token={token}&session=s1"));
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await?;

    // Quiesce and wait for the injected `ls` to echo back.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    let mut seen = String::new();
    while !seen.contains("ls") {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("injection never observed: {seen}");
        }
        if let Some(Ok(tungstenite::Message::Text(text))) = ws.next().await {
            if let Ok(ServerFrame::Output { data, binary: false }) =
                serde_json::from_str::<ServerFrame>(&text)
            {
                seen.push_str(&data);
            }
        }
    }
    Ok(())
}
