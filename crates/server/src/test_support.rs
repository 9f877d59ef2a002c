// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: builders, a scripted PTY backend, and
//! assertion helpers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::monitor::MonitorManager;
use crate::pty::Backend;
use crate::sessions::session::{PtySession, SessionClient, SEND_QUEUE_FRAMES};
use crate::sessions::SessionRegistry;
use crate::store::Store;
use crate::strategy::StrategyEngine;
use crate::transport::frames::ServerFrame;

/// Convert any displayable error into `anyhow::Error` (tests return
/// `anyhow::Result` because unwrap is denied crate-wide).
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Scripted PTY backend: emits whatever the test feeds through
/// `script_tx`, records written input and resize calls, and reports EOF
/// when the script channel closes.
pub struct FakeBackend {
    script_rx: mpsc::Receiver<Bytes>,
    written: Arc<parking_lot::Mutex<Vec<u8>>>,
    resizes: Arc<parking_lot::Mutex<Vec<(u16, u16)>>>,
}

/// Test-side handle to a [`FakeBackend`].
#[derive(Clone)]
pub struct FakeBackendHandle {
    pub script_tx: mpsc::Sender<Bytes>,
    pub written: Arc<parking_lot::Mutex<Vec<u8>>>,
    pub resizes: Arc<parking_lot::Mutex<Vec<(u16, u16)>>>,
}

impl FakeBackendHandle {
    pub async fn emit(&self, bytes: &[u8]) -> anyhow::Result<()> {
        self.script_tx.send(Bytes::copy_from_slice(bytes)).await.anyhow()
    }

    pub fn written_string(&self) -> String {
        String::from_utf8_lossy(&self.written.lock()).into_owned()
    }

    pub fn last_resize(&self) -> Option<(u16, u16)> {
        self.resizes.lock().last().copied()
    }
}

pub fn fake_backend() -> (FakeBackend, FakeBackendHandle) {
    let (script_tx, script_rx) = mpsc::channel(64);
    let written = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let resizes = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let backend = FakeBackend {
        script_rx,
        written: Arc::clone(&written),
        resizes: Arc::clone(&resizes),
    };
    (backend, FakeBackendHandle { script_tx, written, resizes })
}

#[async_trait]
impl Backend for FakeBackend {
    async fn run(
        &mut self,
        output_tx: mpsc::Sender<Bytes>,
        mut input_rx: mpsc::Receiver<Bytes>,
        mut resize_rx: mpsc::Receiver<(u16, u16)>,
    ) -> anyhow::Result<()> {
        let mut input_closed = false;
        let mut resize_closed = false;
        loop {
            tokio::select! {
                script = self.script_rx.recv() => {
                    match script {
                        Some(bytes) => {
                            if output_tx.send(bytes).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                data = input_rx.recv(), if !input_closed => {
                    match data {
                        Some(data) => self.written.lock().extend_from_slice(&data),
                        None => input_closed = true,
                    }
                }
                dims = resize_rx.recv(), if !resize_closed => {
                    match dims {
                        Some(dims) => self.resizes.lock().push(dims),
                        None => resize_closed = true,
                    }
                }
            }
        }
        Ok(())
    }
}

/// A full session stack on an in-memory store with a scripted backend.
pub struct SessionCtx {
    pub store: Arc<Store>,
    pub monitors: Arc<MonitorManager>,
    pub registry: Arc<SessionRegistry>,
    pub session: Arc<PtySession>,
    pub backend: FakeBackendHandle,
}

pub async fn spawn_fake_session(
    container_id: i64,
    session_id: &str,
) -> anyhow::Result<SessionCtx> {
    let store = Arc::new(Store::open_in_memory()?);
    let engine = Arc::new(StrategyEngine::new());
    let monitors = Arc::new(MonitorManager::new(Arc::clone(&store), engine));
    let registry = Arc::new(SessionRegistry::new(
        Arc::clone(&store),
        Arc::clone(&monitors),
        64 * 1024,
    ));

    let (backend, handle) = fake_backend();
    let session = registry
        .get_or_create(container_id, Some(session_id.to_owned()), (80, 24), || async {
            Ok(Box::new(backend) as Box<dyn Backend>)
        })
        .await?;

    Ok(SessionCtx { store, monitors, registry, session, backend: handle })
}

/// A client attached to a test session. `recv` mirrors the transport
/// writer's byte accounting.
pub struct TestClient {
    pub id: u64,
    pub rx: mpsc::Receiver<ServerFrame>,
    pub queued_bytes: Arc<AtomicUsize>,
    pub evicted: CancellationToken,
}

impl TestClient {
    pub async fn recv(&mut self) -> Option<ServerFrame> {
        let frame = self.rx.recv().await?;
        let len = frame.payload_len();
        let current = self.queued_bytes.load(Ordering::Relaxed);
        self.queued_bytes.store(current.saturating_sub(len), Ordering::Relaxed);
        Some(frame)
    }

    /// Receive with a short timeout, for asserting on live output.
    pub async fn recv_timeout(&mut self) -> anyhow::Result<ServerFrame> {
        tokio::time::timeout(std::time::Duration::from_secs(2), self.recv())
            .await
            .anyhow()?
            .ok_or_else(|| anyhow::anyhow!("client channel closed"))
    }
}

pub async fn attach_client(
    registry: &SessionRegistry,
    session: &PtySession,
    cols: u16,
    rows: u16,
) -> anyhow::Result<TestClient> {
    let id = registry.next_client_id();
    let (frame_tx, rx) = mpsc::channel(SEND_QUEUE_FRAMES);
    let queued_bytes = Arc::new(AtomicUsize::new(0));
    let evicted = CancellationToken::new();
    let attached = session
        .attach(SessionClient {
            id,
            frame_tx,
            queued_bytes: Arc::clone(&queued_bytes),
            evicted: evicted.clone(),
            cols,
            rows,
        })
        .await;
    if !attached {
        anyhow::bail!("attach failed");
    }
    Ok(TestClient { id, rx, queued_bytes, evicted })
}

/// Full application state on an in-memory store, for HTTP handler tests.
/// The admin credential is fixed to admin / hunter2.
pub fn make_app_state() -> anyhow::Result<Arc<crate::state::AppState>> {
    use clap::Parser;

    let config = crate::config::Config::try_parse_from(["berth"]).anyhow()?;
    let store = Arc::new(Store::open_in_memory()?);
    let cipher = crate::crypto::Cipher::new("test-encryption-key")?;
    let admin = crate::auth::AdminCredential::new("admin", "hunter2");
    let tokens = crate::auth::TokenService::new("test-signing-secret");
    let controller = Arc::new(crate::runtime::Controller::new(
        Arc::clone(&store),
        std::path::PathBuf::from("/tmp/berth-test-workspaces"),
        (20000, 21000),
    ));
    let engine = Arc::new(StrategyEngine::new());
    let monitors = Arc::new(MonitorManager::new(Arc::clone(&store), engine));
    let registry = Arc::new(SessionRegistry::new(
        Arc::clone(&store),
        Arc::clone(&monitors),
        64 * 1024,
    ));
    Ok(Arc::new(crate::state::AppState {
        config,
        store,
        cipher,
        admin,
        tokens,
        controller,
        monitors,
        registry,
        shutdown: CancellationToken::new(),
    }))
}

/// Collect the text of every Output frame in a list.
pub fn output_text(frames: &[ServerFrame]) -> String {
    let mut out = String::new();
    for frame in frames {
        if let ServerFrame::Output { data, binary: false } = frame {
            out.push_str(data);
        }
    }
    out
}
