// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Network resilience primitives
//!
//! Connectivity tracking, per-session abort handles, and the queue of sends
//! waiting for the connection to come back.

pub mod abort;
pub mod monitor;
pub mod probe;

pub use abort::{AbortHandle, AbortReason};
pub use monitor::{NetworkMonitor, NetworkState, PendingRetryEntry, SessionId};
pub use probe::{HttpProbe, ReachabilityProbe, StaticProbe};

/// Live view of whether the network is usable
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity that never changes, for callers without a monitor
#[derive(Debug, Clone, Copy)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}
