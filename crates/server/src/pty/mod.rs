// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY backend seam. The production backend is a Docker exec with TTY; the
//! session layer only sees the channel triple, so tests substitute a
//! scripted backend.

mod exec;

pub use exec::DockerExecBackend;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// A running PTY. `run` owns all I/O on the PTY: it forwards output chunks
/// until EOF, writes input in arrival order (single writer), and applies
/// resize requests. Returning `Ok(())` means the PTY reached EOF.
#[async_trait]
pub trait Backend: Send {
    async fn run(
        &mut self,
        output_tx: mpsc::Sender<Bytes>,
        input_rx: mpsc::Receiver<Bytes>,
        resize_rx: mpsc::Receiver<(u16, u16)>,
    ) -> anyhow::Result<()>;
}
