// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-session abort handles

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ChatError};

/// Why a stream session was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Explicit stop from the user (or teardown of the owner)
    User,
    /// Connectivity was lost while the stream was running
    Disconnect,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::User => write!(f, "stopped by user"),
            AbortReason::Disconnect => write!(f, "cancelled by disconnect"),
        }
    }
}

/// Abort signal shared between the orchestrator, the network monitor and
/// the transport. Clones observe the same cancellation.
///
/// The first recorded reason wins: a session stopped by the user and then
/// swept by a disconnect stays a user stop.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    token: CancellationToken,
    reason: Arc<OnceLock<AbortReason>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the session
    pub fn abort(&self, reason: AbortReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<AbortReason> {
        self.reason.get().copied()
    }

    /// Resolves once the handle is aborted
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// The error a stream observing this handle should fail with
    pub fn error(&self) -> ChatError {
        ApiError::Aborted(self.reason().unwrap_or(AbortReason::User)).into()
    }

    /// Fail fast if the handle was already aborted
    pub fn check(&self) -> Result<(), ChatError> {
        if self.is_aborted() {
            Err(self.error())
        } else {
            Ok(())
        }
    }
}
