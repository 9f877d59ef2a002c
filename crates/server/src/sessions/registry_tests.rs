// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use crate::monitor::MonitorManager;
use crate::pty::Backend;
use crate::sessions::SessionRegistry;
use crate::store::Store;
use crate::strategy::StrategyEngine;
use crate::test_support::fake_backend;

fn registry() -> anyhow::Result<Arc<SessionRegistry>> {
    let store = Arc::new(Store::open_in_memory()?);
    let engine = Arc::new(StrategyEngine::new());
    let monitors = Arc::new(MonitorManager::new(Arc::clone(&store), engine));
    Ok(Arc::new(SessionRegistry::new(store, monitors, 4096)))
}

#[tokio::test]
async fn minted_session_ids_are_unique() -> anyhow::Result<()> {
    let registry = registry()?;
    let (b1, _h1) = fake_backend();
    let (b2, _h2) = fake_backend();

    let s1 = registry
        .get_or_create(1, None, (80, 24), || async { Ok(Box::new(b1) as Box<dyn Backend>) })
        .await?;
    let s2 = registry
        .get_or_create(1, None, (80, 24), || async { Ok(Box::new(b2) as Box<dyn Backend>) })
        .await?;

    assert_ne!(s1.session_id, s2.session_id);
    assert_eq!(registry.list(1).await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn same_id_shares_one_session() -> anyhow::Result<()> {
    let registry = registry()?;
    let (b1, _h1) = fake_backend();

    let first = registry
        .get_or_create(1, Some("shared".to_owned()), (80, 24), || async {
            Ok(Box::new(b1) as Box<dyn Backend>)
        })
        .await?;
    // The factory must not run again for an existing session.
    let second = registry
        .get_or_create(1, Some("shared".to_owned()), (80, 24), || async {
            anyhow::bail!("factory should not be called")
        })
        .await?;

    assert!(Arc::ptr_eq(&first, &second));
    Ok(())
}

#[tokio::test]
async fn sessions_are_scoped_per_container() -> anyhow::Result<()> {
    let registry = registry()?;
    let (b1, _h1) = fake_backend();
    let (b2, _h2) = fake_backend();

    registry
        .get_or_create(1, Some("s".to_owned()), (80, 24), || async {
            Ok(Box::new(b1) as Box<dyn Backend>)
        })
        .await?;
    registry
        .get_or_create(2, Some("s".to_owned()), (80, 24), || async {
            Ok(Box::new(b2) as Box<dyn Backend>)
        })
        .await?;

    assert_eq!(registry.list(1).await.len(), 1);
    assert_eq!(registry.list(2).await.len(), 1);
    assert!(registry.get(1, "s").await.is_some());
    assert!(registry.get(3, "s").await.is_none());
    Ok(())
}

#[tokio::test]
async fn close_all_for_container() -> anyhow::Result<()> {
    let registry = registry()?;
    let (b1, _h1) = fake_backend();
    let (b2, _h2) = fake_backend();

    registry
        .get_or_create(1, Some("a".to_owned()), (80, 24), || async {
            Ok(Box::new(b1) as Box<dyn Backend>)
        })
        .await?;
    registry
        .get_or_create(1, Some("b".to_owned()), (80, 24), || async {
            Ok(Box::new(b2) as Box<dyn Backend>)
        })
        .await?;

    registry.close_all_for(1).await;

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    loop {
        if registry.list(1).await.is_empty() {
            return Ok(());
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("sessions never closed");
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn list_reports_session_info() -> anyhow::Result<()> {
    let registry = registry()?;
    let (b1, _h1) = fake_backend();
    registry
        .get_or_create(1, Some("info".to_owned()), (120, 40), || async {
            Ok(Box::new(b1) as Box<dyn Backend>)
        })
        .await?;

    let infos = registry.list(1).await;
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].id, "info");
    assert_eq!(infos[0].client_count, 0);
    assert!(infos[0].running);
    assert_eq!((infos[0].width, infos[0].height), (120, 40));
    Ok(())
}
