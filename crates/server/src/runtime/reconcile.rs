// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog ↔ runtime reconciliation. Runs at startup and on a periodic
//! tick: records whose handle vanished are orphaned, drifted statuses are
//! updated, and managed runtime containers missing from the catalog are
//! re-adopted from their labels.

use std::sync::Arc;
use std::time::Duration;

use bollard::query_parameters::{InspectContainerOptions, ListContainersOptions};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::runtime::controller::{map_runtime_status, Controller, ID_LABEL, MANAGED_LABEL, NAME_LABEL};
use crate::runtime::{docker, is_not_found};
use crate::store::{ContainerStatus, Store};

/// Outcome counts for one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub orphaned: usize,
    pub updated: usize,
    pub adopted: usize,
}

/// One reconciliation pass over the whole catalog.
pub async fn reconcile(store: &Store) -> anyhow::Result<ReconcileReport> {
    let docker = docker()?;
    let mut report = ReconcileReport::default();

    // Pass 1: every catalog record against the runtime.
    for record in store.list_containers()? {
        let Some(runtime_id) = record.runtime_id.clone() else {
            continue;
        };
        match docker
            .inspect_container(&runtime_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => {
                let observed = inspect
                    .state
                    .and_then(|s| s.status)
                    .map(map_runtime_status)
                    .unwrap_or(record.status);
                if record.orphaned {
                    store.set_container_orphaned(record.id, false)?;
                    report.updated += 1;
                }
                if observed != record.status {
                    debug!(container = record.id, from = %record.status, to = %observed,
                        "status drift");
                    store.set_container_status(record.id, observed)?;
                    report.updated += 1;
                }
            }
            Err(ref e) if is_not_found(e) => {
                if !record.orphaned {
                    warn!(container = record.id, "runtime handle missing, marking orphaned");
                    store.set_container_orphaned(record.id, true)?;
                    report.orphaned += 1;
                }
            }
            Err(e) => {
                warn!(container = record.id, err = %e, "inspect failed during reconcile");
            }
        }
    }

    // Pass 2: managed runtime containers absent from the catalog.
    let summaries = docker
        .list_containers(Some(ListContainersOptions { all: true, ..Default::default() }))
        .await?;
    for summary in summaries {
        let labels = summary.labels.unwrap_or_default();
        if labels.get(MANAGED_LABEL).map(String::as_str) != Some("true") {
            continue;
        }
        let Some(runtime_id) = summary.id else { continue };

        let known = store
            .list_containers()?
            .iter()
            .any(|r| r.runtime_id.as_deref() == Some(runtime_id.as_str()));
        if known {
            continue;
        }

        let name = labels
            .get(NAME_LABEL)
            .cloned()
            .or_else(|| {
                summary
                    .names
                    .as_ref()
                    .and_then(|n| n.first())
                    .map(|n| n.trim_start_matches('/').to_owned())
            })
            .unwrap_or_else(|| runtime_id.chars().take(12).collect());
        let image = summary.image.unwrap_or_else(|| "unknown".to_owned());

        let observed = match docker
            .inspect_container(&runtime_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => inspect
                .state
                .and_then(|s| s.status)
                .map(map_runtime_status)
                .unwrap_or(ContainerStatus::Stopped),
            Err(_) => ContainerStatus::Stopped,
        };

        // A record with the same name (e.g. previously orphaned) is
        // re-bound rather than duplicated.
        if let Some(existing) = store.get_container_by_name(&name)? {
            store.set_container_runtime_id(existing.id, &runtime_id)?;
            store.set_container_orphaned(existing.id, false)?;
            store.set_container_status(existing.id, observed)?;
            info!(container = existing.id, name = %name, "re-bound orphaned record");
            report.adopted += 1;
            continue;
        }

        let labels_for_record = labels
            .iter()
            .filter(|(k, _)| *k != MANAGED_LABEL && *k != ID_LABEL && *k != NAME_LABEL)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let id = store.insert_container(
            &name,
            &image,
            None,
            &labels_for_record,
            &Default::default(),
            None,
            None,
            None,
            None,
        )?;
        store.set_container_runtime_id(id, &runtime_id)?;
        store.set_container_status(id, observed)?;
        info!(container = id, name = %name, "re-adopted unmanaged record");
        report.adopted += 1;
    }

    Ok(report)
}

/// Spawn the periodic reconciler, running one pass immediately.
pub fn spawn_reconciler(
    store: Arc<Store>,
    _controller: Arc<Controller>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    match reconcile(&store).await {
                        Ok(report) if report != ReconcileReport::default() => {
                            info!(orphaned = report.orphaned, updated = report.updated,
                                adopted = report.adopted, "reconciliation pass");
                        }
                        Ok(_) => {}
                        Err(e) => debug!(err = %e, "reconciliation unavailable"),
                    }
                }
            }
        }
    });
}
