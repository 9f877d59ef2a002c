// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container runtime integration: Docker client singleton, security policy,
//! lifecycle controller, and catalog reconciliation.

pub mod controller;
pub mod policy;
pub mod reconcile;

pub use controller::Controller;
pub use policy::{validate_spec, CreateSpec, PolicyError};

use std::sync::OnceLock;

use anyhow::Context;
use bollard::Docker;

static DOCKER: OnceLock<Docker> = OnceLock::new();

/// Process-wide Docker client. Connected lazily on first use; callers get
/// an immutable handle. The underlying connection is shared and closed on
/// process exit.
pub fn docker() -> anyhow::Result<&'static Docker> {
    if let Some(client) = DOCKER.get() {
        return Ok(client);
    }
    let client =
        Docker::connect_with_local_defaults().context("connecting to container runtime")?;
    // A concurrent initializer may have won; either handle is fine.
    let _ = DOCKER.set(client);
    DOCKER.get().context("runtime client initialization raced")
}

/// True when the error is the runtime's 404 (handle unknown).
pub fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }
    )
}
