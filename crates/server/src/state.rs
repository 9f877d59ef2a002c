// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::{AdminCredential, TokenService};
use crate::config::Config;
use crate::crypto::Cipher;
use crate::monitor::MonitorManager;
use crate::runtime::Controller;
use crate::sessions::SessionRegistry;
use crate::store::Store;

/// Shared application state passed to all handlers via the axum `State`
/// extractor.
pub struct AppState {
    pub config: Config,
    pub store: Arc<Store>,
    pub cipher: Cipher,
    pub admin: AdminCredential,
    pub tokens: TokenService,
    pub controller: Arc<Controller>,
    pub monitors: Arc<MonitorManager>,
    pub registry: Arc<SessionRegistry>,
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("admin", &self.admin.username())
            .finish()
    }
}
