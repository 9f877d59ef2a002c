// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket frame types for the terminal channel. Frames are JSON objects
//! tagged by `type`; `input`/`output` carry a `data` string that is UTF-8
//! unless `binary` is set, in which case it is base64.

use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Frames sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Bytes for PTY stdin.
    Input {
        data: String,
        #[serde(default)]
        binary: bool,
    },
    /// New desired dimensions for this client.
    Resize { cols: u16, rows: u16 },
    /// Pre-canned command string, written verbatim to stdin.
    KeyboardCommand { data: String },
    /// Signed line delta. Advisory; the server drops it.
    Scroll { data: i64 },
    Keepalive {},
    Ack {},
}

impl ClientFrame {
    /// Decode an input-bearing frame's payload to raw bytes.
    pub fn input_bytes(&self) -> Option<Bytes> {
        match self {
            Self::Input { data, binary: false } => Some(Bytes::from(data.clone().into_bytes())),
            Self::Input { data, binary: true } => {
                B64.decode(data).ok().map(Bytes::from)
            }
            Self::KeyboardCommand { data } => Some(Bytes::from(data.clone().into_bytes())),
            _ => None,
        }
    }
}

/// Frames sent by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// PTY output bytes.
    Output {
        data: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        binary: bool,
    },
    Keepalive {},
    Ack {},
    /// Structured error. The connection may close after terminal errors.
    Error { code: String, message: String },
    /// The PTY is gone; the connection closes after this frame.
    PtyClosed {},
    /// Monitoring pipeline result surfaced to attached clients.
    Notification {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        strategy: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        action: Option<String>,
    },
}

impl ServerFrame {
    /// Wrap raw PTY bytes: UTF-8 passes through, anything else goes base64.
    pub fn output(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::Output { data: text.to_owned(), binary: false },
            Err(_) => Self::Output { data: B64.encode(bytes), binary: true },
        }
    }

    pub fn error(code: crate::error::ErrorCode, message: impl Into<String>) -> Self {
        Self::Error { code: code.as_str().to_owned(), message: message.into() }
    }

    /// Approximate wire size, used for send-queue byte accounting.
    pub fn payload_len(&self) -> usize {
        match self {
            Self::Output { data, .. } => data.len(),
            Self::Notification { message, .. } => message.len(),
            Self::Error { message, .. } => message.len(),
            _ => 16,
        }
    }
}

#[cfg(test)]
#[path = "frames_tests.rs"]
mod tests;
