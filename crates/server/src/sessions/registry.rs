// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::info;

use crate::monitor::MonitorManager;
use crate::pty::Backend;
use crate::sessions::session::{spawn_session, PtySession, SessionInfo, SessionSeed};
use crate::store::Store;

type SessionKey = (i64, String);

/// Registry of live PTY sessions, keyed by (container id, session id).
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<SessionKey, Arc<PtySession>>>>,
    /// Serializes create paths so two clients racing on a new session id
    /// share one PTY instead of spawning two.
    create_lock: Mutex<()>,
    cleanup_tx: mpsc::Sender<SessionKey>,
    store: Arc<Store>,
    monitors: Arc<MonitorManager>,
    history_size: usize,
    client_ids: AtomicU64,
}

impl SessionRegistry {
    pub fn new(store: Arc<Store>, monitors: Arc<MonitorManager>, history_size: usize) -> Self {
        let inner: Arc<RwLock<HashMap<SessionKey, Arc<PtySession>>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let (cleanup_tx, mut cleanup_rx) = mpsc::channel::<SessionKey>(64);

        let map = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Some(key) = cleanup_rx.recv().await {
                map.write().await.remove(&key);
            }
        });

        Self {
            inner,
            create_lock: Mutex::new(()),
            cleanup_tx,
            store,
            monitors,
            history_size,
            client_ids: AtomicU64::new(1),
        }
    }

    /// Mint a process-unique client id.
    pub fn next_client_id(&self) -> u64 {
        self.client_ids.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn get(&self, container_id: i64, session_id: &str) -> Option<Arc<PtySession>> {
        self.inner
            .read()
            .await
            .get(&(container_id, session_id.to_owned()))
            .cloned()
    }

    /// Fetch an existing session or create one with the supplied backend
    /// factory. A missing `session_id` mints one.
    pub async fn get_or_create<F, Fut>(
        &self,
        container_id: i64,
        session_id: Option<String>,
        initial_dims: (u16, u16),
        make_backend: F,
    ) -> anyhow::Result<Arc<PtySession>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Box<dyn Backend>>>,
    {
        let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let key = (container_id, session_id.clone());

        let _guard = self.create_lock.lock().await;
        if let Some(existing) = self.inner.read().await.get(&key) {
            if existing.is_running() {
                return Ok(Arc::clone(existing));
            }
        }

        let backend = make_backend().await?;
        let seed = SessionSeed {
            container_id,
            session_id: session_id.clone(),
            history_size: self.history_size,
            initial_dims,
            store: Arc::clone(&self.store),
            monitors: Arc::clone(&self.monitors),
            cleanup: self.cleanup_tx.clone(),
        };
        let session = spawn_session(seed, backend);
        self.inner.write().await.insert(key, Arc::clone(&session));
        self.monitors
            .bind_session(container_id, session.write_back())
            .await;
        info!(container = container_id, session = %session_id, "pty session created");
        Ok(session)
    }

    /// Active sessions for one container.
    pub async fn list(&self, container_id: i64) -> Vec<SessionInfo> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|((cid, _), _)| *cid == container_id)
            .map(|(_, s)| s.info())
            .collect()
    }

    /// Close one session; true when it existed.
    pub async fn close(&self, container_id: i64, session_id: &str) -> bool {
        match self.get(container_id, session_id).await {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Close every session attached to a container (stop/remove paths).
    pub async fn close_all_for(&self, container_id: i64) {
        let sessions: Vec<Arc<PtySession>> = self
            .inner
            .read()
            .await
            .iter()
            .filter(|((cid, _), _)| *cid == container_id)
            .map(|(_, s)| Arc::clone(s))
            .collect();
        for session in sessions {
            session.close();
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
