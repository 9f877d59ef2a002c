// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Security policy validated before any container is created. A spec that
//! fails any check is rejected; no runtime call is made.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::paths;

/// Upper bound on container memory (128 GiB).
pub const MAX_MEMORY_BYTES: i64 = 128 * 1024 * 1024 * 1024;
/// CPU quota/period bounds in microseconds, inclusive.
pub const CPU_MICROS_MIN: i64 = 1_000;
pub const CPU_MICROS_MAX: i64 = 1_000_000;
/// Default pids cap.
pub const DEFAULT_PIDS_LIMIT: i64 = 256;

/// Capabilities added back after dropping ALL.
pub const ALLOWED_CAPABILITIES: &[&str] = &["CHOWN", "SETUID", "SETGID", "DAC_OVERRIDE"];

/// Security options every container gets. The named seccomp profile is the
/// runtime default, never unconfined.
pub const REQUIRED_SECURITY_OPTS: &[&str] = &["no-new-privileges", "seccomp=default"];

/// Default in-container account.
pub const DEFAULT_USER: &str = "developer";

/// A bind mount requested for a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindMount {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

/// Validated container creation spec. `new` fills the policy defaults;
/// [`validate_spec`] checks the final shape.
#[derive(Debug, Clone)]
pub struct CreateSpec {
    pub name: String,
    pub image: String,
    pub repo_url: Option<String>,
    /// `KEY=value` assignments, one per entry.
    pub env: Vec<String>,
    pub mounts: Vec<BindMount>,
    /// Container ports to expose (host ports are allocated by the controller).
    pub expose_ports: Vec<u16>,
    pub memory: Option<i64>,
    pub cpu_quota: Option<i64>,
    pub cpu_period: Option<i64>,
    pub pids_limit: Option<i64>,
    pub network_mode: Option<String>,
    pub privileged: bool,
    pub cap_drop: Vec<String>,
    pub cap_add: Vec<String>,
    pub security_opts: Vec<String>,
    pub user: Option<String>,
    /// Set only for explicit, authenticated root requests.
    pub allow_root: bool,
    pub labels: HashMap<String, String>,
}

impl CreateSpec {
    /// A spec with the policy defaults applied.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            repo_url: None,
            env: Vec::new(),
            mounts: Vec::new(),
            expose_ports: Vec::new(),
            memory: Some(2 * 1024 * 1024 * 1024),
            cpu_quota: Some(100_000),
            cpu_period: Some(100_000),
            pids_limit: Some(DEFAULT_PIDS_LIMIT),
            network_mode: None,
            privileged: false,
            cap_drop: vec!["ALL".to_owned()],
            cap_add: ALLOWED_CAPABILITIES.iter().map(|s| (*s).to_owned()).collect(),
            security_opts: REQUIRED_SECURITY_OPTS.iter().map(|s| (*s).to_owned()).collect(),
            user: Some(DEFAULT_USER.to_owned()),
            allow_root: false,
            labels: HashMap::new(),
        }
    }
}

/// Why a spec was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    Privileged,
    HostNetwork,
    RuntimeSocketMount(String),
    MountEscapesWorkspace(String),
    MissingResourceLimit(&'static str),
    MemoryTooLarge(i64),
    CpuOutOfRange(i64),
    PidsTooLarge(i64),
    CapabilitiesNotDropped,
    CapabilityNotAllowed(String),
    SeccompUnconfined,
    MissingSecurityOpt(&'static str),
    RootUser,
    BadEnvFormat(String),
    EmptyName,
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Privileged => f.write_str("privileged containers are not allowed"),
            Self::HostNetwork => f.write_str("host networking is not allowed"),
            Self::RuntimeSocketMount(src) => {
                write!(f, "mounting the runtime control socket is not allowed: {src}")
            }
            Self::MountEscapesWorkspace(src) => {
                write!(f, "bind mount escapes the workspace root: {src}")
            }
            Self::MissingResourceLimit(which) => {
                write!(f, "resource limit must be set: {which}")
            }
            Self::MemoryTooLarge(v) => {
                write!(f, "memory limit {v} exceeds {MAX_MEMORY_BYTES} bytes")
            }
            Self::CpuOutOfRange(v) => write!(
                f,
                "cpu quota/period {v} outside [{CPU_MICROS_MIN}, {CPU_MICROS_MAX}] microseconds"
            ),
            Self::PidsTooLarge(v) => {
                write!(f, "pids limit {v} exceeds {DEFAULT_PIDS_LIMIT}")
            }
            Self::CapabilitiesNotDropped => f.write_str("all capabilities must be dropped"),
            Self::CapabilityNotAllowed(cap) => {
                write!(f, "capability not in the allowed set: {cap}")
            }
            Self::SeccompUnconfined => f.write_str("seccomp=unconfined is not allowed"),
            Self::MissingSecurityOpt(opt) => write!(f, "missing security option: {opt}"),
            Self::RootUser => f.write_str("root user requires an explicit authenticated request"),
            Self::BadEnvFormat(line) => write!(f, "invalid env assignment: {line}"),
            Self::EmptyName => f.write_str("container name must not be empty"),
        }
    }
}

impl std::error::Error for PolicyError {}

fn env_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // The pattern is a compile-time constant.
        #[allow(clippy::unwrap_used)]
        let re = Regex::new(r"^[A-Z_][A-Z0-9_]*=.*$").unwrap();
        re
    })
}

/// Validate one `KEY=value` env assignment.
pub fn env_line_ok(line: &str) -> bool {
    env_line_regex().is_match(line)
}

/// Validate a creation spec against the security policy.
///
/// `workspace_root` is the directory bind-mount sources must stay under.
pub fn validate_spec(spec: &CreateSpec, workspace_root: &Path) -> Result<(), PolicyError> {
    if spec.name.trim().is_empty() {
        return Err(PolicyError::EmptyName);
    }
    if spec.privileged {
        return Err(PolicyError::Privileged);
    }

    match spec.network_mode.as_deref() {
        None | Some("bridge") => {}
        Some("host") => return Err(PolicyError::HostNetwork),
        // Named user-defined bridge networks are fine.
        Some(_) => {}
    }

    // Capabilities: drop ALL, add back only the allowed set.
    if !spec.cap_drop.iter().any(|c| c.eq_ignore_ascii_case("ALL")) {
        return Err(PolicyError::CapabilitiesNotDropped);
    }
    for cap in &spec.cap_add {
        let bare = cap.strip_prefix("CAP_").unwrap_or(cap);
        if !ALLOWED_CAPABILITIES.iter().any(|a| a.eq_ignore_ascii_case(bare)) {
            return Err(PolicyError::CapabilityNotAllowed(cap.clone()));
        }
    }

    // Seccomp: named profile attached, no-new-privileges set.
    if spec.security_opts.iter().any(|o| o == "seccomp=unconfined") {
        return Err(PolicyError::SeccompUnconfined);
    }
    for required in REQUIRED_SECURITY_OPTS {
        if !spec.security_opts.iter().any(|o| o == required) {
            return Err(PolicyError::MissingSecurityOpt(required));
        }
    }

    // Resource caps are mandatory and bounded.
    let memory = spec.memory.ok_or(PolicyError::MissingResourceLimit("memory"))?;
    if memory <= 0 || memory > MAX_MEMORY_BYTES {
        return Err(PolicyError::MemoryTooLarge(memory));
    }
    let quota = spec.cpu_quota.ok_or(PolicyError::MissingResourceLimit("cpu quota"))?;
    let period = spec.cpu_period.ok_or(PolicyError::MissingResourceLimit("cpu period"))?;
    for v in [quota, period] {
        if !(CPU_MICROS_MIN..=CPU_MICROS_MAX).contains(&v) {
            return Err(PolicyError::CpuOutOfRange(v));
        }
    }
    let pids = spec.pids_limit.ok_or(PolicyError::MissingResourceLimit("pids"))?;
    if pids <= 0 || pids > DEFAULT_PIDS_LIMIT {
        return Err(PolicyError::PidsTooLarge(pids));
    }

    // Mounts: never the runtime socket, never outside the workspace root.
    for mount in &spec.mounts {
        if mount.source.contains("docker.sock") || mount.source.contains("containerd.sock") {
            return Err(PolicyError::RuntimeSocketMount(mount.source.clone()));
        }
        if paths::resolve_under(workspace_root, &mount.source).is_err() {
            return Err(PolicyError::MountEscapesWorkspace(mount.source.clone()));
        }
    }

    // Non-root default user unless explicitly requested.
    if let Some(user) = spec.user.as_deref() {
        let is_root = user == "root" || user == "0" || user.starts_with("0:");
        if is_root && !spec.allow_root {
            return Err(PolicyError::RootUser);
        }
    }

    // Env assignments must match KEY=value with an upper-case key.
    for line in &spec.env {
        if !env_line_ok(line) {
            return Err(PolicyError::BadEnvFormat(line.clone()));
        }
    }

    Ok(())
}

/// Swap is pinned to the memory limit; expose the derived value.
pub fn swap_for(memory: i64) -> i64 {
    memory
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
