// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Berth: control plane for containerized AI coding sessions. Provisions
//! locked-down containers, streams shared PTYs to browser clients over
//! WebSockets, and runs per-container silence monitors with pluggable
//! reaction strategies.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod monitor;
pub mod paths;
pub mod pty;
pub mod ring;
pub mod runtime;
pub mod sessions;
pub mod state;
pub mod store;
pub mod strategy;
pub mod test_support;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use base64::Engine;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::{AdminCredential, TokenService};
use crate::config::Config;
use crate::crypto::Cipher;
use crate::monitor::MonitorManager;
use crate::runtime::Controller;
use crate::sessions::SessionRegistry;
use crate::state::AppState;
use crate::store::Store;
use crate::strategy::StrategyEngine;

/// Run the server until shutdown.
pub async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    let secrets = config.resolve_secrets();
    let shutdown = CancellationToken::new();

    let store = Arc::new(Store::open(config.database_path())?);
    let cipher = Cipher::new(&secrets.encryption_key)?;
    store.run_legacy_migration(&cipher)?;

    let admin = AdminCredential::new(&secrets.admin_username, &secrets.admin_password);
    persist_admin_user(&store, &secrets.admin_username, &secrets.admin_password)?;
    let tokens = TokenService::new(&secrets.jwt_secret);

    std::fs::create_dir_all(config.workspace_root()).context("creating workspace root")?;
    let controller = Arc::new(Controller::new(
        Arc::clone(&store),
        config.workspace_root(),
        (config.traefik_port_min, config.traefik_port_max),
    ));
    let engine = Arc::new(StrategyEngine::new());
    let monitors = Arc::new(MonitorManager::new(Arc::clone(&store), engine));
    let registry = Arc::new(SessionRegistry::new(
        Arc::clone(&store),
        Arc::clone(&monitors),
        config.history_size,
    ));

    // Startup reconciliation resolves catalog drift; a missing runtime is
    // tolerated so catalog-only endpoints keep working.
    match runtime::reconcile::reconcile(&store).await {
        Ok(report) => info!(orphaned = report.orphaned, updated = report.updated,
            adopted = report.adopted, "startup reconciliation complete"),
        Err(e) => warn!(err = %e, "container runtime unavailable at startup"),
    }
    runtime::reconcile::spawn_reconciler(
        Arc::clone(&store),
        Arc::clone(&controller),
        Duration::from_secs(config.reconcile_interval.max(1)),
        shutdown.clone(),
    );

    if config.auto_start_traefik {
        if let Err(e) = controller.ensure_traefik().await {
            warn!(err = %e, "traefik bootstrap failed");
        }
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState {
        config,
        store,
        cipher,
        admin,
        tokens,
        controller,
        monitors,
        registry,
        shutdown: shutdown.clone(),
    });
    let router = transport::build_router(state);

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }

    info!("berth listening on {addr}");
    let listener = TcpListener::bind(&addr).await.context("binding listener")?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

/// Keep a user row for the admin account in the catalog.
fn persist_admin_user(store: &Store, username: &str, password: &str) -> anyhow::Result<()> {
    let b64 = base64::engine::general_purpose::STANDARD;
    let mut salt = [0u8; 16];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut salt);
    let hash = auth::hash_password(password, &salt);
    store.ensure_user(username, &b64.encode(hash), &b64.encode(salt))?;
    Ok(())
}
