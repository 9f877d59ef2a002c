// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use super::*;
use crate::crypto::Cipher;
use crate::monitor::config::{InjectionConfig, MonitoringConfig, StrategyTag};

fn insert_plain_container(store: &Store, name: &str) -> anyhow::Result<i64> {
    Ok(store.insert_container(
        name,
        "berth-workspace:latest",
        None,
        &HashMap::new(),
        &HashMap::new(),
        Some(1 << 30),
        Some(100_000),
        Some(100_000),
        Some(256),
    )?)
}

// -- containers ---------------------------------------------------------------

#[test]
fn container_crud() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let id = insert_plain_container(&store, "demo")?;

    let record = store.get_container(id)?.ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert_eq!(record.name, "demo");
    assert_eq!(record.status, ContainerStatus::Created);
    assert!(!record.orphaned);
    assert!(record.runtime_id.is_none());

    store.set_container_runtime_id(id, "abc123")?;
    store.set_container_status(id, ContainerStatus::Running)?;
    let record = store.get_container(id)?.ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert_eq!(record.runtime_id.as_deref(), Some("abc123"));
    assert_eq!(record.status, ContainerStatus::Running);
    assert!(record.started_at.is_some());

    store.delete_container(id)?;
    assert!(store.get_container(id)?.is_none());
    // Idempotent.
    store.delete_container(id)?;
    Ok(())
}

#[test]
fn orphaned_records_excluded_from_active_listing() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let a = insert_plain_container(&store, "a")?;
    let b = insert_plain_container(&store, "b")?;

    store.set_container_orphaned(a, true)?;
    let active = store.list_active_containers()?;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, b);

    // Full listing still sees both.
    assert_eq!(store.list_containers()?.len(), 2);
    Ok(())
}

#[test]
fn duplicate_names_rejected() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    insert_plain_container(&store, "dup")?;
    assert!(insert_plain_container(&store, "dup").is_err());
    Ok(())
}

// -- tasks --------------------------------------------------------------------

#[test]
fn tasks_dequeue_in_fifo_order() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let id = insert_plain_container(&store, "demo")?;

    store.enqueue_task(id, "first")?;
    store.enqueue_task(id, "second")?;
    store.enqueue_task(id, "third")?;

    let t1 = store.dequeue_task(id)?.ok_or_else(|| anyhow::anyhow!("empty"))?;
    let t2 = store.dequeue_task(id)?.ok_or_else(|| anyhow::anyhow!("empty"))?;
    let t3 = store.dequeue_task(id)?.ok_or_else(|| anyhow::anyhow!("empty"))?;
    assert_eq!(t1.command, "first");
    assert_eq!(t2.command, "second");
    assert_eq!(t3.command, "third");
    assert_eq!(t1.state, TaskState::Running);
    assert!(store.dequeue_task(id)?.is_none());
    Ok(())
}

#[test]
fn tasks_are_scoped_per_container() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let a = insert_plain_container(&store, "a")?;
    let b = insert_plain_container(&store, "b")?;

    store.enqueue_task(a, "for-a")?;
    store.enqueue_task(b, "for-b")?;

    let task = store.dequeue_task(b)?.ok_or_else(|| anyhow::anyhow!("empty"))?;
    assert_eq!(task.command, "for-b");
    assert!(store.dequeue_task(b)?.is_none());
    Ok(())
}

#[test]
fn running_tasks_complete_on_idle() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let id = insert_plain_container(&store, "demo")?;
    store.enqueue_task(id, "work")?;
    store.dequeue_task(id)?;

    assert_eq!(store.complete_running_tasks(id)?, 1);
    let tasks = store.list_tasks(id)?;
    assert_eq!(tasks[0].state, TaskState::Completed);
    assert!(tasks[0].completed_at.is_some());
    Ok(())
}

// -- monitoring config --------------------------------------------------------

#[test]
fn monitoring_config_round_trip() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let id = insert_plain_container(&store, "demo")?;

    let cfg = MonitoringConfig {
        enabled: true,
        silence_threshold: 30,
        strategy: StrategyTag::Injection,
        webhook: None,
        injection: Some(InjectionConfig { command: Some("ls".to_owned()) }),
        queue: None,
        ai: None,
        buffer_size: 8192,
    };
    store.put_monitoring_config(id, &cfg)?;

    let loaded = store
        .get_monitoring_config(id)?
        .ok_or_else(|| anyhow::anyhow!("missing config"))?;
    assert!(loaded.enabled);
    assert_eq!(loaded.silence_threshold, 30);
    assert_eq!(loaded.strategy, StrategyTag::Injection);
    assert_eq!(
        loaded.injection.and_then(|i| i.command).as_deref(),
        Some("ls")
    );

    // Upsert replaces.
    let mut updated = cfg.clone();
    updated.silence_threshold = 60;
    store.put_monitoring_config(id, &updated)?;
    let loaded = store
        .get_monitoring_config(id)?
        .ok_or_else(|| anyhow::anyhow!("missing config"))?;
    assert_eq!(loaded.silence_threshold, 60);
    Ok(())
}

// -- automation log -----------------------------------------------------------

#[test]
fn automation_log_appends() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let id = insert_plain_container(&store, "demo")?;

    store.append_automation(id, "injection", "inject", Some("ls\n"), None, true, None)?;
    store.append_automation(id, "ai", "skip", None, None, true, None)?;
    store.append_automation(id, "webhook", "error", None, None, false, Some("boom"))?;

    let entries = store.list_automation(id, 10)?;
    assert_eq!(entries.len(), 3);
    // Newest first.
    assert_eq!(entries[0].action, "error");
    assert!(!entries[0].success);
    assert_eq!(entries[0].error.as_deref(), Some("boom"));
    assert_eq!(entries[2].action, "inject");
    assert_eq!(entries[2].command.as_deref(), Some("ls\n"));
    Ok(())
}

// -- settings + encryption ----------------------------------------------------

#[test]
fn settings_are_encrypted_at_rest() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let cipher = Cipher::new("key")?;

    store.put_setting(&cipher, "github_token", "ghp_secret")?;
    assert_eq!(store.get_setting(&cipher, "github_token")?.as_deref(), Some("ghp_secret"));

    let sealed = store
        .get_setting_sealed("github_token")?
        .ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert!(!sealed.ciphertext.contains("ghp_secret"));
    Ok(())
}

// -- legacy migration ---------------------------------------------------------

#[test]
fn legacy_migration_is_idempotent() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let cipher = Cipher::new("key")?;

    store.put_setting(&cipher, "custom_env", "FOO=bar")?;
    store.put_setting(&cipher, "startup_command", "make dev")?;
    store.put_setting(&cipher, "github_token", "ghp_secret")?;

    store.run_legacy_migration(&cipher)?;
    assert!(store.migration_flag("legacy_profiles")?);
    assert_eq!(store.get_env_profile("default")?.as_deref(), Some("FOO=bar"));
    assert_eq!(store.get_startup_profile("default")?.as_deref(), Some("make dev"));

    // Running again must not duplicate or overwrite.
    store.put_env_profile("default", "FOO=changed")?;
    store.run_legacy_migration(&cipher)?;
    assert_eq!(store.get_env_profile("default")?.as_deref(), Some("FOO=changed"));
    Ok(())
}

#[test]
fn migration_flag_survives_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("berth.db");
    let cipher = Cipher::new("key")?;
    {
        let store = Store::open(&path)?;
        store.put_setting(&cipher, "custom_env", "FOO=bar")?;
        store.run_legacy_migration(&cipher)?;
    }

    // A restart sees the flag row and does not migrate again.
    let store = Store::open(&path)?;
    assert!(store.migration_flag("legacy_profiles")?);
    store.run_legacy_migration(&cipher)?;
    assert_eq!(store.get_env_profile("default")?.as_deref(), Some("FOO=bar"));
    Ok(())
}

// -- terminal sessions --------------------------------------------------------

#[test]
fn terminal_session_lifecycle() -> anyhow::Result<()> {
    let store = Store::open_in_memory()?;
    let id = insert_plain_container(&store, "demo")?;

    store.upsert_terminal_session("s1", id, 80, 24)?;
    let sessions = store.list_terminal_sessions(id)?;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].cols, 80);
    assert!(sessions[0].closed_at.is_none());

    store.close_terminal_session("s1", b"final history bytes")?;
    let sessions = store.list_terminal_sessions(id)?;
    assert!(sessions[0].closed_at.is_some());
    assert_eq!(
        store.get_terminal_history("s1")?.as_deref(),
        Some(b"final history bytes".as_slice())
    );

    // Reattach reopens the row.
    store.upsert_terminal_session("s1", id, 100, 30)?;
    let sessions = store.list_terminal_sessions(id)?;
    assert!(sessions[0].closed_at.is_none());
    assert_eq!(sessions[0].cols, 100);
    Ok(())
}
