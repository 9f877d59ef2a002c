// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container lifecycle controller: creates, starts, stops, and removes
//! containers through the runtime, keeping the catalog in step.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bollard::models::{ContainerCreateBody, ContainerStateStatusEnum, HostConfig, PortBinding};
use bollard::query_parameters::{
    CreateContainerOptions, InspectContainerOptions, KillContainerOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use futures_util::StreamExt;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::runtime::policy::{self, CreateSpec};
use crate::runtime::{docker, is_not_found};
use crate::store::{ContainerRecord, ContainerStatus, Store};

/// Label marking containers owned by this control plane.
pub const MANAGED_LABEL: &str = "berth.managed";
/// Label carrying the catalog id.
pub const ID_LABEL: &str = "berth.container-id";
/// Label carrying the human name.
pub const NAME_LABEL: &str = "berth.name";

/// Default grace period before stop escalates, seconds.
pub const DEFAULT_STOP_GRACE_SECS: u64 = 10;

/// Lifecycle controller over the runtime + catalog pair.
pub struct Controller {
    store: Arc<Store>,
    workspace_root: PathBuf,
    port_range: (u16, u16),
}

impl Controller {
    pub fn new(store: Arc<Store>, workspace_root: PathBuf, port_range: (u16, u16)) -> Self {
        Self { store, workspace_root, port_range }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Validate the spec against the security policy and create the
    /// container. Returns the catalog id. Never retries on failure.
    pub async fn create(&self, spec: CreateSpec) -> Result<i64, ApiError> {
        policy::validate_spec(&spec, &self.workspace_root)
            .map_err(|e| ApiError::policy(e.to_string()))?;

        if self
            .store
            .get_container_by_name(&spec.name)
            .map_err(ApiError::from)?
            .is_some()
        {
            return Err(ApiError::conflict(format!(
                "container name already in use: {}",
                spec.name
            )));
        }

        let ports = self.allocate_ports(&spec.expose_ports)?;
        let id = self
            .store
            .insert_container(
                &spec.name,
                &spec.image,
                spec.repo_url.as_deref(),
                &spec.labels,
                &ports,
                spec.memory,
                spec.cpu_quota,
                spec.cpu_period,
                spec.pids_limit,
            )
            .map_err(ApiError::from)?;

        match self.runtime_create(id, &spec, &ports).await {
            Ok(runtime_id) => {
                self.store
                    .set_container_runtime_id(id, &runtime_id)
                    .map_err(ApiError::from)?;
                info!(container = id, runtime = %runtime_id, name = %spec.name,
                    "container created");
                Ok(id)
            }
            Err(e) => {
                // Reported, never silently retried. The placeholder record
                // is withdrawn so a corrected request can reuse the name.
                let _ = self.store.delete_container(id);
                Err(e)
            }
        }
    }

    async fn runtime_create(
        &self,
        id: i64,
        spec: &CreateSpec,
        ports: &HashMap<u16, u16>,
    ) -> Result<String, ApiError> {
        let docker = docker().map_err(ApiError::upstream)?;

        let mut labels = spec.labels.clone();
        labels.insert(MANAGED_LABEL.to_owned(), "true".to_owned());
        labels.insert(ID_LABEL.to_owned(), id.to_string());
        labels.insert(NAME_LABEL.to_owned(), spec.name.clone());

        let memory = spec.memory.unwrap_or_default();
        let binds: Vec<String> = spec
            .mounts
            .iter()
            .map(|m| {
                let mode = if m.read_only { "ro" } else { "rw" };
                format!("{}:{}:{mode}", m.source, m.target)
            })
            .collect();

        let mut exposed = HashMap::new();
        let mut bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        for (container_port, host_port) in ports {
            let key = format!("{container_port}/tcp");
            exposed.insert(key.clone(), HashMap::new());
            bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: Some("127.0.0.1".to_owned()),
                    host_port: Some(host_port.to_string()),
                }]),
            );
        }

        let host_config = HostConfig {
            memory: Some(memory),
            memory_swap: Some(policy::swap_for(memory)),
            cpu_quota: spec.cpu_quota,
            cpu_period: spec.cpu_period,
            pids_limit: spec.pids_limit,
            cap_drop: Some(spec.cap_drop.clone()),
            cap_add: Some(spec.cap_add.clone()),
            security_opt: Some(spec.security_opts.clone()),
            network_mode: Some(spec.network_mode.clone().unwrap_or_else(|| "bridge".to_owned())),
            binds: if binds.is_empty() { None } else { Some(binds) },
            port_bindings: if bindings.is_empty() { None } else { Some(bindings) },
            privileged: Some(false),
            ..Default::default()
        };

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            env: if spec.env.is_empty() { None } else { Some(spec.env.clone()) },
            labels: Some(labels),
            user: spec.user.clone(),
            exposed_ports: if exposed.is_empty() { None } else { Some(exposed) },
            host_config: Some(host_config),
            tty: Some(true),
            open_stdin: Some(true),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: Some(format!("berth-{}", spec.name)),
            ..Default::default()
        };

        let created = docker
            .create_container(Some(options), body)
            .await
            .map_err(ApiError::from)?;
        Ok(created.id)
    }

    /// Start the container.
    pub async fn start(&self, id: i64) -> Result<(), ApiError> {
        let record = self.require_record(id)?;
        let runtime_id = require_handle(&record)?;
        let docker = docker().map_err(ApiError::upstream)?;
        docker
            .start_container(&runtime_id, None::<StartContainerOptions>)
            .await
            .map_err(ApiError::from)?;
        self.store
            .set_container_status(id, ContainerStatus::Running)
            .map_err(ApiError::from)?;
        info!(container = id, "container started");
        Ok(())
    }

    /// Stop with a grace period; on failure, retry once with SIGKILL.
    pub async fn stop(&self, id: i64, grace_secs: Option<u64>) -> Result<(), ApiError> {
        let record = self.require_record(id)?;
        let runtime_id = require_handle(&record)?;
        let docker = docker().map_err(ApiError::upstream)?;
        let grace = grace_secs.unwrap_or(DEFAULT_STOP_GRACE_SECS);

        let stop = docker
            .stop_container(
                &runtime_id,
                Some(StopContainerOptions { t: Some(grace as i32), ..Default::default() }),
            )
            .await;

        match stop {
            Ok(()) => {}
            Err(ref e) if is_not_found(e) => {
                self.store.set_container_orphaned(id, true).map_err(ApiError::from)?;
                return Err(ApiError::not_found("container"));
            }
            Err(e) => {
                warn!(container = id, err = %e, "graceful stop failed, escalating to SIGKILL");
                docker
                    .kill_container(
                        &runtime_id,
                        Some(KillContainerOptions { signal: "SIGKILL".to_owned() }),
                    )
                    .await
                    .map_err(ApiError::from)?;
            }
        }

        self.store
            .set_container_status(id, ContainerStatus::Stopped)
            .map_err(ApiError::from)?;
        info!(container = id, "container stopped");
        Ok(())
    }

    /// Remove the container and delete its record. Idempotent.
    pub async fn remove(&self, id: i64) -> Result<(), ApiError> {
        let record = match self.store.get_container(id).map_err(ApiError::from)? {
            Some(r) => r,
            None => return Ok(()),
        };

        if let Some(runtime_id) = record.runtime_id.as_deref() {
            let docker = docker().map_err(ApiError::upstream)?;
            let removed = docker
                .remove_container(
                    runtime_id,
                    Some(RemoveContainerOptions { force: true, ..Default::default() }),
                )
                .await;
            match removed {
                Ok(()) => {}
                Err(ref e) if is_not_found(e) => {}
                Err(e) => return Err(ApiError::from(e)),
            }
        }

        self.store.delete_container(id).map_err(ApiError::from)?;
        info!(container = id, "container removed");
        Ok(())
    }

    /// Observe the runtime status, updating the record on drift.
    pub async fn status(&self, id: i64) -> Result<ContainerStatus, ApiError> {
        let record = self.require_record(id)?;
        let runtime_id = require_handle(&record)?;
        let docker = docker().map_err(ApiError::upstream)?;

        let inspect = docker
            .inspect_container(&runtime_id, None::<InspectContainerOptions>)
            .await;
        let inspect = match inspect {
            Ok(v) => v,
            Err(ref e) if is_not_found(e) => {
                self.store.set_container_orphaned(id, true).map_err(ApiError::from)?;
                return Err(ApiError::not_found("container"));
            }
            Err(e) => return Err(ApiError::from(e)),
        };

        let observed = inspect
            .state
            .and_then(|s| s.status)
            .map(map_runtime_status)
            .unwrap_or(record.status);
        if observed != record.status {
            self.store
                .set_container_status(id, observed)
                .map_err(ApiError::from)?;
        }
        Ok(observed)
    }

    /// Tail container logs as UTF-8 (lossy).
    pub async fn logs(&self, id: i64, tail: usize) -> Result<String, ApiError> {
        let record = self.require_record(id)?;
        let runtime_id = require_handle(&record)?;
        let docker = docker().map_err(ApiError::upstream)?;

        let options = LogsOptions { stdout: true, stderr: true, ..Default::default() };
        let mut stream = docker.logs(&runtime_id, Some(options));
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(ApiError::from)?;
            out.extend_from_slice(&chunk.into_bytes());
        }
        let text = String::from_utf8_lossy(&out);
        let lines: Vec<&str> = text.lines().collect();
        let skip = lines.len().saturating_sub(tail);
        Ok(lines[skip..].join("\n"))
    }

    /// Run a one-shot command inside the container, collecting its output.
    pub async fn exec(&self, id: i64, argv: Vec<String>) -> Result<String, ApiError> {
        let record = self.require_record(id)?;
        let runtime_id = require_handle(&record)?;
        let docker = docker().map_err(ApiError::upstream)?;

        let exec = docker
            .create_exec(
                &runtime_id,
                bollard::exec::CreateExecOptions {
                    cmd: Some(argv),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(ApiError::from)?;

        let started = docker
            .start_exec(&exec.id, None::<bollard::exec::StartExecOptions>)
            .await
            .map_err(ApiError::from)?;

        let mut out = Vec::new();
        if let bollard::exec::StartExecResults::Attached { mut output, .. } = started {
            while let Some(chunk) = output.next().await {
                let chunk = chunk.map_err(ApiError::from)?;
                out.extend_from_slice(&chunk.into_bytes());
            }
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Make sure the container is running before a PTY attaches.
    pub async fn ensure_running(&self, id: i64) -> Result<ContainerRecord, ApiError> {
        let record = self.require_record(id)?;
        match self.status(id).await? {
            ContainerStatus::Running => {}
            ContainerStatus::Created | ContainerStatus::Stopped => {
                self.start(id).await?;
            }
            ContainerStatus::Removed => return Err(ApiError::not_found("container")),
        }
        self.require_record(record.id)
    }

    /// Bring up the traefik reverse proxy container if configured.
    pub async fn ensure_traefik(&self) -> anyhow::Result<()> {
        let docker = docker()?;
        let name = "berth-traefik";
        match docker.inspect_container(name, None::<InspectContainerOptions>).await {
            Ok(inspect) => {
                let running = inspect
                    .state
                    .and_then(|s| s.running)
                    .unwrap_or(false);
                if !running {
                    docker.start_container(name, None::<StartContainerOptions>).await?;
                }
                return Ok(());
            }
            Err(ref e) if is_not_found(e) => {}
            Err(e) => return Err(e.into()),
        }

        let mut labels = HashMap::new();
        labels.insert(MANAGED_LABEL.to_owned(), "true".to_owned());
        let entry_port = self.port_range.0;
        let mut bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        bindings.insert(
            "80/tcp".to_owned(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_owned()),
                host_port: Some(entry_port.to_string()),
            }]),
        );

        let body = ContainerCreateBody {
            image: Some("traefik:v3.1".to_owned()),
            labels: Some(labels),
            cmd: Some(vec![
                "--providers.docker=true".to_owned(),
                "--providers.docker.exposedbydefault=false".to_owned(),
                "--entrypoints.web.address=:80".to_owned(),
            ]),
            host_config: Some(HostConfig {
                binds: Some(vec!["/var/run/docker.sock:/var/run/docker.sock:ro".to_owned()]),
                port_bindings: Some(bindings),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = CreateContainerOptions { name: Some(name.to_owned()), ..Default::default() };
        docker.create_container(Some(options), body).await?;
        docker.start_container(name, None::<StartContainerOptions>).await?;
        info!(port = entry_port, "traefik started");
        Ok(())
    }

    /// Allocate host ports for the requested container ports from the
    /// configured range, skipping ports already held by the catalog.
    fn allocate_ports(&self, wanted: &[u16]) -> Result<HashMap<u16, u16>, ApiError> {
        if wanted.is_empty() {
            return Ok(HashMap::new());
        }
        let taken: std::collections::HashSet<u16> = self
            .store
            .allocated_host_ports()
            .map_err(ApiError::from)?
            .into_iter()
            .collect();

        let mut out = HashMap::new();
        let mut candidate = self.port_range.0;
        for container_port in wanted {
            let host = loop {
                if candidate > self.port_range.1 {
                    return Err(ApiError::conflict("host port range exhausted"));
                }
                let port = candidate;
                candidate += 1;
                if !taken.contains(&port) && !out.values().any(|&p| p == port) {
                    break port;
                }
            };
            out.insert(*container_port, host);
        }
        Ok(out)
    }

    fn require_record(&self, id: i64) -> Result<ContainerRecord, ApiError> {
        let record = self
            .store
            .get_container(id)
            .map_err(ApiError::from)?
            .ok_or_else(|| ApiError::not_found("container"))?;
        if record.orphaned {
            return Err(ApiError::not_found("container"));
        }
        Ok(record)
    }
}

fn require_handle(record: &ContainerRecord) -> Result<String, ApiError> {
    record
        .runtime_id
        .clone()
        .ok_or_else(|| ApiError::conflict("container has no runtime handle"))
}

/// Map the runtime's status enum onto catalog status.
pub fn map_runtime_status(status: ContainerStateStatusEnum) -> ContainerStatus {
    match status {
        ContainerStateStatusEnum::RUNNING
        | ContainerStateStatusEnum::PAUSED
        | ContainerStateStatusEnum::RESTARTING => ContainerStatus::Running,
        ContainerStateStatusEnum::CREATED => ContainerStatus::Created,
        ContainerStateStatusEnum::EXITED | ContainerStateStatusEnum::DEAD => {
            ContainerStatus::Stopped
        }
        ContainerStateStatusEnum::REMOVING => ContainerStatus::Removed,
        _ => ContainerStatus::Stopped,
    }
}
