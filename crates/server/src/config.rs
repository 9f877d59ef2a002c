// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;
use rand::RngCore;

/// Control plane for containerized AI coding sessions.
#[derive(Debug, Clone, Parser)]
#[command(name = "berth", version, about)]
pub struct Config {
    /// HTTP port to listen on.
    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Path to the SQLite database file.
    #[arg(long, env = "DATABASE_PATH")]
    pub database_path: Option<PathBuf>,

    /// Secret for signing bearer tokens. Generated at startup when absent.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Key material for settings encryption. Generated at startup when absent.
    #[arg(long, env = "ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,

    /// Admin account name.
    #[arg(long, env = "ADMIN_USERNAME")]
    pub admin_username: Option<String>,

    /// Admin account password.
    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Directory for container workspaces and on-disk state.
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Start the traefik reverse proxy container at boot.
    #[arg(long, env = "AUTO_START_TRAEFIK", default_value_t = false)]
    pub auto_start_traefik: bool,

    /// Lower bound of the host port range allocated to containers.
    #[arg(long, env = "TRAEFIK_PORT_MIN", default_value = "20000")]
    pub traefik_port_min: u16,

    /// Upper bound of the host port range allocated to containers.
    #[arg(long, env = "TRAEFIK_PORT_MAX", default_value = "21000")]
    pub traefik_port_max: u16,

    /// Seconds between catalog/runtime reconciliation ticks.
    #[arg(long, env = "BERTH_RECONCILE_INTERVAL", default_value = "60")]
    pub reconcile_interval: u64,

    /// PTY output history ring size in bytes per session.
    #[arg(long, env = "BERTH_HISTORY_SIZE", default_value = "262144")]
    pub history_size: usize,

    /// Log format (json or text).
    #[arg(long, env = "BERTH_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "BERTH_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.traefik_port_min >= self.traefik_port_max {
            anyhow::bail!(
                "TRAEFIK_PORT_MIN ({}) must be below TRAEFIK_PORT_MAX ({})",
                self.traefik_port_min,
                self.traefik_port_max
            );
        }
        if self.history_size == 0 {
            anyhow::bail!("history size must be non-zero");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    /// Resolved database path (defaults to `<data_dir>/berth.db`).
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| self.data_dir.join("berth.db"))
    }

    /// Root directory under which container workspaces live. Bind mounts
    /// must stay inside this tree.
    pub fn workspace_root(&self) -> PathBuf {
        self.data_dir.join("workspaces")
    }

    /// Resolve secrets, generating any that were not supplied.
    ///
    /// A generated admin password is logged exactly once at INFO so the
    /// operator can log in on a fresh deployment.
    pub fn resolve_secrets(&self) -> Secrets {
        let jwt_secret = match &self.jwt_secret {
            Some(s) => s.clone(),
            None => {
                tracing::warn!("JWT_SECRET not set, generating an ephemeral one");
                random_hex(32)
            }
        };
        let encryption_key = match &self.encryption_key {
            Some(s) => s.clone(),
            None => {
                tracing::warn!("ENCRYPTION_KEY not set, generating an ephemeral one");
                random_hex(32)
            }
        };
        let admin_username =
            self.admin_username.clone().unwrap_or_else(|| "admin".to_owned());
        let admin_password = match &self.admin_password {
            Some(p) => p.clone(),
            None => {
                let generated = random_hex(16);
                tracing::info!(username = %admin_username, password = %generated,
                    "ADMIN_PASSWORD not set, generated admin credentials");
                generated
            }
        };
        Secrets { jwt_secret, encryption_key, admin_username, admin_password }
    }
}

/// Secrets resolved at startup (supplied or generated).
#[derive(Clone)]
pub struct Secrets {
    pub jwt_secret: String,
    pub encryption_key: String,
    pub admin_username: String,
    pub admin_password: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").field("admin_username", &self.admin_username).finish()
    }
}

/// Hex-encode `n` random bytes.
pub fn random_hex(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    rand::rng().fill_bytes(&mut bytes);
    let mut out = String::with_capacity(n * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
