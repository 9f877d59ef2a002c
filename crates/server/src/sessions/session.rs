// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session loop: reads PTY output, appends history, forks bytes to the
//! monitoring hook, and fans out to every attached client's bounded queue.
//! Attach, detach, resize, and broadcast all pass through the loop's control
//! channel, so snapshot-then-live ordering needs no extra locking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ErrorCode;
use crate::monitor::MonitorManager;
use crate::pty::Backend;
use crate::ring::ByteRing;
use crate::sessions::epoch_ms;
use crate::store::Store;
use crate::transport::frames::ServerFrame;

/// Send queue bound in frames.
pub const SEND_QUEUE_FRAMES: usize = 256;
/// Send queue bound in payload bytes.
pub const SEND_QUEUE_BYTES: usize = 1 << 20;

/// A client registered with a session. The writer end drains `frame_tx`'s
/// receiver; `queued_bytes` tracks in-flight payload for the byte bound;
/// `evicted` fires when the session drops a stalled client.
pub struct SessionClient {
    pub id: u64,
    pub frame_tx: mpsc::Sender<ServerFrame>,
    pub queued_bytes: Arc<AtomicUsize>,
    pub evicted: CancellationToken,
    pub cols: u16,
    pub rows: u16,
}

/// Control messages handled by the session loop.
enum Control {
    Attach { client: SessionClient, done: oneshot::Sender<()> },
    Detach { client_id: u64 },
    Resize { client_id: u64, cols: u16, rows: u16 },
    Broadcast { frame: ServerFrame },
    History { reply: oneshot::Sender<Vec<u8>> },
}

/// Capability handle a monitor uses to act on the session: write into the
/// PTY and broadcast notification frames. Holds only channel senders, so a
/// closed session makes these no-ops rather than keeping it alive.
#[derive(Clone)]
pub struct WriteBack {
    input_tx: mpsc::Sender<Bytes>,
    control_tx: mpsc::Sender<Control>,
}

impl WriteBack {
    /// Write bytes into the PTY input stream. False if the session is gone.
    pub async fn write_bytes(&self, bytes: Vec<u8>) -> bool {
        self.input_tx.send(Bytes::from(bytes)).await.is_ok()
    }

    /// Broadcast a frame to every attached client.
    pub async fn broadcast(&self, frame: ServerFrame) -> bool {
        self.control_tx.send(Control::Broadcast { frame }).await.is_ok()
    }
}

/// Listing entry for one active session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub client_count: usize,
    pub running: bool,
    pub width: u16,
    pub height: u16,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// Shared handle to a running session.
pub struct PtySession {
    pub container_id: i64,
    pub session_id: String,
    created_at: DateTime<Utc>,
    last_active_ms: Arc<AtomicU64>,
    client_count: Arc<AtomicUsize>,
    effective_dims: Arc<parking_lot::Mutex<(u16, u16)>>,
    running: Arc<AtomicBool>,
    control_tx: mpsc::Sender<Control>,
    input_tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
}

impl PtySession {
    /// Register a client. Its queue receives the history snapshot first,
    /// then live output with no gap and no duplicates.
    pub async fn attach(&self, client: SessionClient) -> bool {
        let (done, done_rx) = oneshot::channel();
        if self.control_tx.send(Control::Attach { client, done }).await.is_err() {
            return false;
        }
        done_rx.await.is_ok()
    }

    pub async fn detach(&self, client_id: u64) {
        let _ = self.control_tx.send(Control::Detach { client_id }).await;
    }

    /// Update one client's desired dimensions; the PTY is resized to the
    /// minimum over all attached clients.
    pub async fn resize(&self, client_id: u64, cols: u16, rows: u16) {
        let _ = self.control_tx.send(Control::Resize { client_id, cols, rows }).await;
    }

    /// Append client input to the session's serialized input stream.
    pub async fn write(&self, bytes: Bytes) -> bool {
        self.touch();
        self.input_tx.send(bytes).await.is_ok()
    }

    /// Broadcast a frame to all attached clients.
    pub async fn broadcast(&self, frame: ServerFrame) {
        let _ = self.control_tx.send(Control::Broadcast { frame }).await;
    }

    /// Current history ring contents.
    pub async fn history(&self) -> Vec<u8> {
        let (reply, rx) = oneshot::channel();
        if self.control_tx.send(Control::History { reply }).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Explicitly close the session; clients get `pty_closed`.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn write_back(&self) -> WriteBack {
        WriteBack { input_tx: self.input_tx.clone(), control_tx: self.control_tx.clone() }
    }

    pub fn info(&self) -> SessionInfo {
        let (width, height) = *self.effective_dims.lock();
        let last_ms = self.last_active_ms.load(Ordering::Relaxed);
        SessionInfo {
            id: self.session_id.clone(),
            client_count: self.client_count.load(Ordering::Relaxed),
            running: self.is_running(),
            width,
            height,
            created_at: self.created_at,
            last_active: Utc
                .timestamp_millis_opt(last_ms as i64)
                .single()
                .unwrap_or(self.created_at),
        }
    }

    fn touch(&self) {
        self.last_active_ms.store(epoch_ms(), Ordering::Relaxed);
    }
}

/// Everything a new session needs besides its backend.
pub(crate) struct SessionSeed {
    pub container_id: i64,
    pub session_id: String,
    pub history_size: usize,
    pub initial_dims: (u16, u16),
    pub store: Arc<Store>,
    pub monitors: Arc<MonitorManager>,
    pub cleanup: mpsc::Sender<(i64, String)>,
}

/// Spawn the backend task and the session loop; returns the shared handle.
pub(crate) fn spawn_session(seed: SessionSeed, mut backend: Box<dyn Backend>) -> Arc<PtySession> {
    let (output_tx, output_rx) = mpsc::channel::<Bytes>(256);
    let (input_tx, input_rx) = mpsc::channel::<Bytes>(256);
    let (resize_tx, resize_rx) = mpsc::channel::<(u16, u16)>(8);
    let (control_tx, control_rx) = mpsc::channel::<Control>(64);
    let cancel = CancellationToken::new();

    let session = Arc::new(PtySession {
        container_id: seed.container_id,
        session_id: seed.session_id.clone(),
        created_at: Utc::now(),
        last_active_ms: Arc::new(AtomicU64::new(epoch_ms())),
        client_count: Arc::new(AtomicUsize::new(0)),
        effective_dims: Arc::new(parking_lot::Mutex::new(seed.initial_dims)),
        running: Arc::new(AtomicBool::new(true)),
        control_tx,
        input_tx,
        cancel: cancel.clone(),
    });

    let container_id = seed.container_id;
    let session_id = seed.session_id.clone();
    tokio::spawn(async move {
        if let Err(e) = backend.run(output_tx, input_rx, resize_rx).await {
            warn!(container = container_id, session = %session_id, err = %e, "pty backend error");
        }
    });

    let loop_ctx = SessionLoop {
        seed,
        session: Arc::clone(&session),
        output_rx,
        control_rx,
        resize_tx,
        cancel,
    };
    tokio::spawn(loop_ctx.run());

    session
}

struct SessionLoop {
    seed: SessionSeed,
    session: Arc<PtySession>,
    output_rx: mpsc::Receiver<Bytes>,
    control_rx: mpsc::Receiver<Control>,
    resize_tx: mpsc::Sender<(u16, u16)>,
    cancel: CancellationToken,
}

impl SessionLoop {
    async fn run(self) {
        let SessionLoop { seed, session, mut output_rx, mut control_rx, resize_tx, cancel } =
            self;
        let mut ring = ByteRing::new(seed.history_size);
        let mut clients: HashMap<u64, SessionClient> = HashMap::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(session = %seed.session_id, "session closed explicitly");
                    break;
                }

                chunk = output_rx.recv() => {
                    match chunk {
                        Some(bytes) => {
                            ring.write(&bytes);
                            seed.monitors.on_output(seed.container_id, &bytes);
                            session.touch();
                            let frame = ServerFrame::output(&bytes);
                            fan_out(&mut clients, &frame);
                            session.client_count.store(clients.len(), Ordering::Relaxed);
                        }
                        None => {
                            debug!(session = %seed.session_id, "pty reached EOF");
                            break;
                        }
                    }
                }

                control = control_rx.recv() => {
                    let Some(control) = control else { break };
                    match control {
                        Control::Attach { client, done } => {
                            // History snapshot as a single preamble frame,
                            // then the client joins live fan-out.
                            if !ring.is_empty() {
                                let frame = ServerFrame::output(&ring.snapshot());
                                client.queued_bytes
                                    .fetch_add(frame.payload_len(), Ordering::Relaxed);
                                let _ = client.frame_tx.try_send(frame);
                            }
                            let _ = seed.store.upsert_terminal_session(
                                &seed.session_id,
                                seed.container_id,
                                client.cols,
                                client.rows,
                            );
                            clients.insert(client.id, client);
                            recompute_dims(&session, &resize_tx, &clients);
                            session.client_count.store(clients.len(), Ordering::Relaxed);
                            session.touch();
                            let _ = done.send(());
                        }
                        Control::Detach { client_id } => {
                            clients.remove(&client_id);
                            recompute_dims(&session, &resize_tx, &clients);
                            session.client_count.store(clients.len(), Ordering::Relaxed);
                        }
                        Control::Resize { client_id, cols, rows } => {
                            if let Some(client) = clients.get_mut(&client_id) {
                                client.cols = cols;
                                client.rows = rows;
                            }
                            recompute_dims(&session, &resize_tx, &clients);
                        }
                        Control::Broadcast { frame } => {
                            fan_out(&mut clients, &frame);
                            session.client_count.store(clients.len(), Ordering::Relaxed);
                        }
                        Control::History { reply } => {
                            let _ = reply.send(ring.snapshot());
                        }
                    }
                }
            }
        }

        // Teardown: terminal frame to every client, persist the final
        // history snapshot, release the monitor binding and registry slot.
        session.running.store(false, Ordering::Release);
        for client in clients.values() {
            let _ = client.frame_tx.try_send(ServerFrame::PtyClosed {});
        }
        clients.clear();

        if let Err(e) = seed
            .store
            .close_terminal_session(&seed.session_id, &ring.snapshot())
        {
            warn!(session = %seed.session_id, err = %e, "failed to persist session close");
        }
        seed.monitors.on_session_closed(seed.container_id).await;
        let _ = seed
            .cleanup
            .send((seed.container_id, seed.session_id.clone()))
            .await;
    }
}

/// Effective PTY size is the minimum over attached clients, so every
/// client sees a fully visible screen.
fn recompute_dims(
    session: &PtySession,
    resize_tx: &mpsc::Sender<(u16, u16)>,
    clients: &HashMap<u64, SessionClient>,
) {
    let Some(min) = clients
        .values()
        .map(|c| (c.cols, c.rows))
        .reduce(|a, b| (a.0.min(b.0), a.1.min(b.1)))
    else {
        return;
    };
    let mut dims = session.effective_dims.lock();
    if *dims != min {
        *dims = min;
        drop(dims);
        if resize_tx.try_send(min).is_err() {
            debug!(session = %session.session_id, "resize channel full, dropping");
        }
    }
}

/// Enqueue a frame to every client; stalled clients are dropped and told
/// why, without disturbing the rest.
fn fan_out(clients: &mut HashMap<u64, SessionClient>, frame: &ServerFrame) {
    let size = frame.payload_len();
    let mut stalled = Vec::new();
    let mut gone = Vec::new();

    for (id, client) in clients.iter() {
        if client.queued_bytes.load(Ordering::Relaxed) + size > SEND_QUEUE_BYTES {
            stalled.push(*id);
            continue;
        }
        match client.frame_tx.try_send(frame.clone()) {
            Ok(()) => {
                client.queued_bytes.fetch_add(size, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => stalled.push(*id),
            Err(mpsc::error::TrySendError::Closed(_)) => gone.push(*id),
        }
    }

    for id in stalled {
        if let Some(client) = clients.remove(&id) {
            warn!(client = id, "send queue overflow, dropping stalled client");
            // Best-effort error frame; the writer also emits one on eviction.
            let _ = client.frame_tx.try_send(ServerFrame::error(
                ErrorCode::Conflict,
                "send queue overflow, client too slow",
            ));
            client.evicted.cancel();
        }
    }
    for id in gone {
        clients.remove(&id);
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
