// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY session registry: one shared PTY per (container, session id), with
//! fan-out to many clients, bounded history, and min-dimension resize.

pub mod registry;
pub mod session;

pub use registry::SessionRegistry;
pub use session::{PtySession, SessionClient, SessionInfo, WriteBack};

/// Current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
