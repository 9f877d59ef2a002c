// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket handler for the terminal channel. One connection multiplexes
//! into a shared PTY session: input frames feed the session's serialized
//! input stream, output frames drain this client's bounded queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ApiError, ErrorCode};
use crate::pty::{Backend, DockerExecBackend};
use crate::sessions::session::{SessionClient, SEND_QUEUE_FRAMES};
use crate::state::AppState;
use crate::transport::auth::verify_ws_token;
use crate::transport::frames::{ClientFrame, ServerFrame};

/// Server keepalive cadence.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
/// Connections silent for this long are closed.
const CLIENT_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Shell started inside the container for interactive sessions.
const DEFAULT_SHELL: &[&str] = &["/bin/bash"];

/// Query parameters on the upgrade request.
#[derive(Debug, Clone, Deserialize)]
pub struct WsQuery {
    /// Bearer credential (query parameter because browser WebSocket
    /// clients cannot set headers).
    pub token: Option<String>,
    /// Session id to attach or resume; minted when absent.
    pub session: Option<String>,
    pub cols: Option<u16>,
    pub rows: Option<u16>,
}

/// `GET /api/ws/terminal/{id}` — upgrade to the terminal frame channel.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    // Authenticate before any frame is exchanged.
    if let Err(err) = verify_ws_token(&state, query.token.as_deref()) {
        return err.into_response();
    }

    // The session layer requires a running container.
    let record = match state.controller.ensure_running(id).await {
        Ok(record) => record,
        Err(err) => return err.into_response(),
    };

    ws.on_upgrade(move |socket| handle_connection(state, record.id, record.runtime_id, query, socket))
        .into_response()
}

async fn handle_connection(
    state: Arc<AppState>,
    container_id: i64,
    runtime_id: Option<String>,
    query: WsQuery,
    socket: WebSocket,
) {
    let cols = query.cols.unwrap_or(80).max(1);
    let rows = query.rows.unwrap_or(24).max(1);

    let session = state
        .registry
        .get_or_create(container_id, query.session.clone(), (cols, rows), || async {
            let runtime_id =
                runtime_id.ok_or_else(|| anyhow::anyhow!("container has no runtime handle"))?;
            let command: Vec<String> = DEFAULT_SHELL.iter().map(|s| (*s).to_owned()).collect();
            let backend = DockerExecBackend::spawn(&runtime_id, &command, cols, rows).await?;
            Ok(Box::new(backend) as Box<dyn Backend>)
        })
        .await;

    let (mut ws_tx, mut ws_rx) = socket.split();
    let session = match session {
        Ok(session) => session,
        Err(e) => {
            let err = ApiError::upstream(e);
            let _ = send_frame(&mut ws_tx, &ServerFrame::error(ErrorCode::Upstream, err.message))
                .await;
            return;
        }
    };

    let client_id = state.registry.next_client_id();
    let (frame_tx, mut frame_rx) = mpsc::channel::<ServerFrame>(SEND_QUEUE_FRAMES);
    let queued_bytes = Arc::new(AtomicUsize::new(0));
    let evicted = CancellationToken::new();

    let attached = session
        .attach(SessionClient {
            id: client_id,
            frame_tx,
            queued_bytes: Arc::clone(&queued_bytes),
            evicted: evicted.clone(),
            cols,
            rows,
        })
        .await;
    if !attached {
        let _ = send_frame(
            &mut ws_tx,
            &ServerFrame::error(ErrorCode::NotFound, "session is closed"),
        )
        .await;
        return;
    }

    debug!(container = container_id, session = %session.session_id, client = client_id,
        "client attached");

    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    keepalive.tick().await; // first tick fires immediately
    let mut idle_deadline = tokio::time::Instant::now() + CLIENT_IDLE_TIMEOUT;

    loop {
        tokio::select! {
            // Session loop evicted this client as stalled.
            _ = evicted.cancelled() => {
                let _ = send_frame(&mut ws_tx, &ServerFrame::error(
                    ErrorCode::Conflict,
                    "disconnected: send queue overflow",
                )).await;
                break;
            }

            // Session → client.
            frame = frame_rx.recv() => {
                match frame {
                    Some(frame) => {
                        queued_bytes.fetch_sub(
                            frame.payload_len().min(queued_bytes.load(Ordering::Relaxed)),
                            Ordering::Relaxed,
                        );
                        let terminal = matches!(frame, ServerFrame::PtyClosed {});
                        if send_frame(&mut ws_tx, &frame).await.is_err() || terminal {
                            break;
                        }
                    }
                    // Session loop ended without a terminal frame.
                    None => break,
                }
            }

            // Liveness.
            _ = keepalive.tick() => {
                if send_frame(&mut ws_tx, &ServerFrame::Keepalive {}).await.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep_until(idle_deadline) => {
                debug!(client = client_id, "client idle timeout");
                break;
            }

            // Client → session.
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(_)) | None => break,
                };
                idle_deadline = tokio::time::Instant::now() + CLIENT_IDLE_TIMEOUT;

                match msg {
                    Message::Text(text) => {
                        let frame: ClientFrame = match serde_json::from_str(&text) {
                            Ok(f) => f,
                            Err(_) => {
                                let err = ServerFrame::error(
                                    ErrorCode::Validation, "invalid frame");
                                if send_frame(&mut ws_tx, &err).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };
                        match frame {
                            ClientFrame::Input { .. } | ClientFrame::KeyboardCommand { .. } => {
                                if let Some(bytes) = frame.input_bytes() {
                                    if !session.write(bytes).await {
                                        break;
                                    }
                                }
                            }
                            ClientFrame::Resize { cols, rows } => {
                                session.resize(client_id, cols.max(1), rows.max(1)).await;
                            }
                            // Advisory terminal-UI hint, forwarded to no one.
                            ClientFrame::Scroll { .. } => {}
                            ClientFrame::Keepalive {} => {
                                if send_frame(&mut ws_tx, &ServerFrame::Ack {}).await.is_err() {
                                    break;
                                }
                            }
                            ClientFrame::Ack {} => {}
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    session.detach(client_id).await;
    debug!(container = container_id, client = client_id, "client detached");
}

async fn send_frame<S>(tx: &mut S, frame: &ServerFrame) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = match serde_json::to_string(frame) {
        Ok(t) => t,
        Err(_) => return Err(()),
    };
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
