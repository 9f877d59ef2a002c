// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `berth` binary as a subprocess on a scratch data
//! directory and exercises it over HTTP and WebSocket.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Admin credentials every spawned process is configured with.
pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASS: &str = "spec-password";

/// Resolve the path to the compiled `berth` binary.
pub fn berth_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("berth")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `berth` process on a scratch data directory.
pub struct BerthProcess {
    child: Child,
    port: u16,
    _data_dir: tempfile::TempDir,
}

impl BerthProcess {
    pub fn start() -> anyhow::Result<Self> {
        let data_dir = tempfile::tempdir()?;
        let port = free_port()?;

        let child = Command::new(berth_binary())
            .env_clear()
            .env("PATH", std::env::var("PATH").unwrap_or_default())
            .env("PORT", port.to_string())
            .env("HOST", "127.0.0.1")
            .env("DATA_DIR", data_dir.path())
            .env("JWT_SECRET", "spec-signing-secret")
            .env("ENCRYPTION_KEY", "spec-encryption-key")
            .env("ADMIN_USERNAME", ADMIN_USER)
            .env("ADMIN_PASSWORD", ADMIN_PASS)
            .env("BERTH_LOG_FORMAT", "text")
            .env("BERTH_LOG_LEVEL", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, port, _data_dir: data_dir })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self, path_and_query: &str) -> String {
        format!("ws://127.0.0.1:{}{path_and_query}", self.port)
    }

    /// Poll until the HTTP listener answers.
    pub async fn wait_ready(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("berth never became ready on port {}", self.port);
            }
            let probe = client
                .get(format!("{}/api/containers", self.base_url()))
                .timeout(Duration::from_millis(500))
                .send()
                .await;
            // Any HTTP answer (401 included) means the server is up.
            if probe.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Log in with the configured admin credential.
    pub async fn login(&self) -> anyhow::Result<String> {
        let client = reqwest::Client::new();
        let body: serde_json::Value = client
            .post(format!("{}/api/auth/login", self.base_url()))
            .json(&serde_json::json!({"username": ADMIN_USER, "password": ADMIN_PASS}))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        body["token"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| anyhow::anyhow!("login response had no token"))
    }
}

impl Drop for BerthProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
