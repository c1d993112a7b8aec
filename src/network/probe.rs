// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Active reachability probes
//!
//! The platform's connectivity flag can be stale in both directions, so the
//! monitor periodically confirms it with a lightweight request.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::Client;

/// A check that reports whether the network is actually reachable
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Returns true when the probe target answered within `timeout`
    async fn check(&self, timeout: Duration) -> bool;
}

/// Probe issuing a no-cache `HEAD` request; any HTTP answer counts as reachable
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn check(&self, timeout: Duration) -> bool {
        let result = self
            .client
            .head(&self.url)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .timeout(timeout)
            .send()
            .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Reachability probe to {} failed: {}", self.url, e);
                false
            }
        }
    }
}

/// Probe with a switchable answer, for tests and for hosts that push
/// connectivity through events only
#[derive(Debug)]
pub struct StaticProbe {
    reachable: AtomicBool,
    calls: AtomicUsize,
}

impl StaticProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of checks performed so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReachabilityProbe for StaticProbe {
    async fn check(&self, _timeout: Duration) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }
}
