// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::pin::Pin;

use anyhow::Context;
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecOptions, StartExecResults};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::debug;

use super::Backend;
use crate::runtime::docker;

type OutputStream =
    Pin<Box<dyn Stream<Item = Result<LogOutput, bollard::errors::Error>> + Send>>;
type InputSink = Pin<Box<dyn tokio::io::AsyncWrite + Send>>;

/// TTY exec inside a running container, attached over the runtime's
/// hijacked connection.
pub struct DockerExecBackend {
    exec_id: String,
    output: OutputStream,
    input: InputSink,
}

impl DockerExecBackend {
    /// Start a TTY exec running `command` in the container and attach.
    pub async fn spawn(
        runtime_id: &str,
        command: &[String],
        cols: u16,
        rows: u16,
    ) -> anyhow::Result<Self> {
        let docker = docker()?;
        let exec = docker
            .create_exec(
                runtime_id,
                CreateExecOptions {
                    cmd: Some(command.to_vec()),
                    attach_stdin: Some(true),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(true),
                    env: Some(vec!["TERM=xterm-256color".to_owned()]),
                    ..Default::default()
                },
            )
            .await
            .context("creating exec")?;

        let started = docker
            .start_exec(&exec.id, Some(StartExecOptions { detach: false, ..Default::default() }))
            .await
            .context("starting exec")?;

        let (output, input) = match started {
            StartExecResults::Attached { output, input } => (output, input),
            StartExecResults::Detached => anyhow::bail!("exec started detached"),
        };

        resize_tty(&exec.id, cols, rows).await;
        Ok(Self { exec_id: exec.id, output, input })
    }
}

/// Resize the remote TTY. Failures are logged, not propagated: a resize
/// that is lost does not invalidate the stream.
async fn resize_tty(exec_id: &str, cols: u16, rows: u16) {
    let Ok(docker) = docker() else { return };
    if let Err(e) = docker
        .resize_exec(exec_id, ResizeExecOptions { height: rows, width: cols })
        .await
    {
        debug!(exec = %exec_id, err = %e, "exec resize failed");
    }
}

#[async_trait]
impl Backend for DockerExecBackend {
    async fn run(
        &mut self,
        output_tx: mpsc::Sender<Bytes>,
        mut input_rx: mpsc::Receiver<Bytes>,
        mut resize_rx: mpsc::Receiver<(u16, u16)>,
    ) -> anyhow::Result<()> {
        let exec_id = self.exec_id.clone();
        let mut input_closed = false;
        let mut resize_closed = false;

        loop {
            tokio::select! {
                chunk = self.output.next() => {
                    match chunk {
                        Some(Ok(log)) => {
                            let bytes = Bytes::from(log.into_bytes());
                            if output_tx.send(bytes).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => return Err(e.into()),
                        // EOF: the exec'd process exited or the container stopped.
                        None => break,
                    }
                }

                data = input_rx.recv(), if !input_closed => {
                    match data {
                        Some(data) => {
                            self.input.write_all(&data).await.context("pty write")?;
                            self.input.flush().await.context("pty flush")?;
                        }
                        None => input_closed = true,
                    }
                }

                dims = resize_rx.recv(), if !resize_closed => {
                    match dims {
                        Some((cols, rows)) => resize_tty(&exec_id, cols, rows).await,
                        None => resize_closed = true,
                    }
                }
            }
        }

        Ok(())
    }
}
