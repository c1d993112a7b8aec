// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Connectivity monitor
//!
//! Tracks whether the network is usable, combining platform connectivity
//! events with active polling. It owns two process-wide collections:
//!
//! - the registry of live stream sessions, aborted together when the
//!   connection drops;
//! - the pending-retry queue of sends deferred while offline, drained and
//!   handed to the replay channel once the connection settles again.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::chat::ChunkSink;
use crate::config::{ModelSettings, NetworkConfig};
use crate::llm::message::Message;

use super::abort::{AbortHandle, AbortReason};
use super::probe::ReachabilityProbe;
use super::Connectivity;

/// Identifier of a registered stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A send deferred because connectivity was lost, captured as requested
pub struct PendingRetryEntry {
    pub messages: Vec<Message>,
    pub model: String,
    pub settings: ModelSettings,
    pub sink: Arc<dyn ChunkSink>,
    /// Whether the interrupted attempt already delivered text to the sink
    pub partial_output: bool,
}

impl fmt::Debug for PendingRetryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRetryEntry")
            .field("messages", &self.messages.len())
            .field("model", &self.model)
            .field("partial_output", &self.partial_output)
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of the monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkState {
    pub is_online: bool,
    pub last_offline_at: Option<DateTime<Utc>>,
    pub last_successful_ping_at: Option<DateTime<Utc>>,
    pub polling_active: bool,
}

#[derive(Default)]
struct MonitorInner {
    last_offline_at: Option<DateTime<Utc>>,
    last_successful_ping_at: Option<DateTime<Utc>>,
    pending: VecDeque<PendingRetryEntry>,
    sessions: HashMap<SessionId, AbortHandle>,
    next_session_id: u64,
}

struct PollingTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Connectivity state machine over {Online, Offline}
pub struct NetworkMonitor {
    config: NetworkConfig,
    probe: Arc<dyn ReachabilityProbe>,
    online: watch::Sender<bool>,
    inner: Mutex<MonitorInner>,
    polling: Mutex<Option<PollingTask>>,
    replay_tx: mpsc::UnboundedSender<PendingRetryEntry>,
}

impl NetworkMonitor {
    /// Create a monitor seeded from the platform's connectivity flag.
    ///
    /// Returns the monitor and the receiving end of the replay channel;
    /// entries arrive there when queued sends are due to be re-issued.
    pub fn new(
        config: NetworkConfig,
        probe: Arc<dyn ReachabilityProbe>,
        initially_online: bool,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<PendingRetryEntry>) {
        let (replay_tx, replay_rx) = mpsc::unbounded_channel();
        let (online, _) = watch::channel(initially_online);

        let inner = MonitorInner {
            last_offline_at: (!initially_online).then(Utc::now),
            ..Default::default()
        };

        let monitor = Arc::new(Self {
            config,
            probe,
            online,
            inner: Mutex::new(inner),
            polling: Mutex::new(None),
            replay_tx,
        });

        (monitor, replay_rx)
    }

    fn lock_inner(&self) -> MutexGuard<'_, MonitorInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Network monitor state lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn lock_polling(&self) -> MutexGuard<'_, Option<PollingTask>> {
        match self.polling.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Network monitor polling lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Watch connectivity changes
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    pub fn state(&self) -> NetworkState {
        let inner = self.lock_inner();
        NetworkState {
            is_online: self.is_online(),
            last_offline_at: inner.last_offline_at,
            last_successful_ping_at: inner.last_successful_ping_at,
            polling_active: self.is_polling(),
        }
    }

    /// Platform reported the connection is back
    pub fn on_platform_online(self: &Arc<Self>) {
        self.set_online(true, "platform event");
    }

    /// Platform reported the connection is gone
    pub fn on_platform_offline(self: &Arc<Self>) {
        self.set_online(false, "platform event");
    }

    fn set_online(self: &Arc<Self>, online: bool, source: &str) {
        let previous = self.online.send_replace(online);
        if previous == online {
            return;
        }

        if online {
            tracing::info!("Connectivity restored ({})", source);
            self.drain_pending();
        } else {
            tracing::warn!("Connectivity lost ({})", source);
            self.abort_all();
        }
    }

    /// Abort every live session as a disconnect and record the offline time
    fn abort_all(&self) {
        let sessions: Vec<(SessionId, AbortHandle)> = {
            let mut inner = self.lock_inner();
            inner.last_offline_at = Some(Utc::now());
            inner.sessions.drain().collect()
        };

        for (id, handle) in sessions {
            tracing::debug!("Aborting {} after disconnect", id);
            handle.abort(AbortReason::Disconnect);
        }
    }

    /// Snapshot-and-clear the queue, then replay it once the connection has
    /// stayed up for the settle delay
    fn drain_pending(self: &Arc<Self>) {
        let snapshot: Vec<PendingRetryEntry> = self.lock_inner().pending.drain(..).collect();
        if snapshot.is_empty() {
            return;
        }

        let monitor = Arc::clone(self);
        let settle = self.config.settle_delay();
        tokio::spawn(async move {
            tokio::time::sleep(settle).await;

            if !monitor.is_online() {
                tracing::warn!(
                    "Connection dropped during settle delay, keeping {} queued sends",
                    snapshot.len()
                );
                monitor.requeue_front(snapshot);
                return;
            }

            tracing::info!("Replaying {} queued sends", snapshot.len());
            let mut undelivered = Vec::new();
            for entry in snapshot {
                if let Err(mpsc::error::SendError(entry)) = monitor.replay_tx.send(entry) {
                    undelivered.push(entry);
                }
            }
            if !undelivered.is_empty() {
                tracing::warn!(
                    "Replay receiver is gone, keeping {} sends queued",
                    undelivered.len()
                );
                monitor.requeue_front(undelivered);
            }
        });
    }

    fn requeue_front(&self, entries: Vec<PendingRetryEntry>) {
        let mut inner = self.lock_inner();
        for entry in entries.into_iter().rev() {
            inner.pending.push_front(entry);
        }
    }

    /// Register a live session so a disconnect can abort it
    pub fn register(&self, handle: AbortHandle) -> SessionId {
        let mut inner = self.lock_inner();
        inner.next_session_id += 1;
        let id = SessionId(inner.next_session_id);
        inner.sessions.insert(id, handle);
        id
    }

    /// Remove a session from the registry
    pub fn unregister(&self, id: SessionId) -> Option<AbortHandle> {
        self.lock_inner().sessions.remove(&id)
    }

    pub fn active_sessions(&self) -> usize {
        self.lock_inner().sessions.len()
    }

    /// Defer a send until connectivity returns.
    ///
    /// An aborted send can land here after the connection already came back,
    /// in which case the queue is drained right away.
    pub fn enqueue(self: &Arc<Self>, entry: PendingRetryEntry) {
        let len = {
            let mut inner = self.lock_inner();
            inner.pending.push_back(entry);
            inner.pending.len()
        };
        tracing::debug!("Queued send for retry ({} pending)", len);

        if self.is_online() {
            self.drain_pending();
        }
    }

    pub fn pending_len(&self) -> usize {
        self.lock_inner().pending.len()
    }

    /// Run one reachability probe and correct the state if it disagrees
    pub async fn probe_now(self: &Arc<Self>) -> bool {
        let reachable = self.probe.check(self.config.probe_timeout()).await;

        if reachable {
            self.lock_inner().last_successful_ping_at = Some(Utc::now());
            if !self.is_online() {
                self.set_online(true, "probe");
            }
        } else if self.is_online() {
            self.set_online(false, "probe");
        }

        reachable
    }

    /// Start periodic probing. Calling it while polling is already active
    /// does nothing.
    pub fn start_polling(self: &Arc<Self>) {
        let mut polling = self.lock_polling();
        if polling.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let stop = token.clone();
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.poll_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(monitor) = weak.upgrade() else {
                    break;
                };
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = monitor.probe_now() => {}
                }
            }
        });

        tracing::debug!("Connectivity polling started every {:?}", interval);
        *polling = Some(PollingTask { token, handle });
    }

    /// Stop periodic probing. Safe to call repeatedly.
    pub fn stop_polling(&self) {
        if let Some(task) = self.lock_polling().take() {
            task.token.cancel();
            task.handle.abort();
            tracing::debug!("Connectivity polling stopped");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.lock_polling().is_some()
    }

    /// Tear down: stop polling, stop live sessions and drop queued sends
    pub fn shutdown(&self) {
        self.stop_polling();

        let (sessions, dropped) = {
            let mut inner = self.lock_inner();
            let dropped = inner.pending.len();
            inner.pending.clear();
            let sessions: Vec<AbortHandle> = inner.sessions.drain().map(|(_, h)| h).collect();
            (sessions, dropped)
        };

        for handle in sessions {
            handle.abort(AbortReason::User);
        }
        if dropped > 0 {
            tracing::debug!("Dropped {} queued sends on shutdown", dropped);
        }
    }
}

impl Connectivity for NetworkMonitor {
    fn is_online(&self) -> bool {
        *self.online.borrow()
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::probe::StaticProbe;
    use std::time::Duration;

    fn fast_config() -> NetworkConfig {
        NetworkConfig {
            poll_interval_ms: 10,
            probe_timeout_ms: 10,
            settle_delay_ms: 20,
            ..NetworkConfig::default()
        }
    }

    fn entry(model: &str) -> PendingRetryEntry {
        PendingRetryEntry {
            messages: vec![Message::user("hello")],
            model: model.to_string(),
            settings: ModelSettings::default(),
            sink: Arc::new(|_: &str| {}),
            partial_output: false,
        }
    }

    #[tokio::test]
    async fn test_initial_state_follows_platform_flag() {
        let (monitor, _rx) =
            NetworkMonitor::new(fast_config(), Arc::new(StaticProbe::new(true)), false);
        let state = monitor.state();

        assert!(!state.is_online);
        assert!(state.last_offline_at.is_some());
        assert!(state.last_successful_ping_at.is_none());
        assert!(!state.polling_active);
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let (monitor, _rx) =
            NetworkMonitor::new(fast_config(), Arc::new(StaticProbe::new(true)), true);
        let a = monitor.register(AbortHandle::new());
        let b = monitor.register(AbortHandle::new());

        assert_ne!(a, b);
        assert_eq!(monitor.active_sessions(), 2);
        assert!(monitor.unregister(a).is_some());
        assert!(monitor.unregister(a).is_none());
        assert_eq!(monitor.active_sessions(), 1);
    }

    #[tokio::test]
    async fn test_offline_aborts_all_sessions_as_disconnect() {
        let (monitor, _rx) =
            NetworkMonitor::new(fast_config(), Arc::new(StaticProbe::new(true)), true);
        let first = AbortHandle::new();
        let second = AbortHandle::new();
        monitor.register(first.clone());
        monitor.register(second.clone());

        monitor.on_platform_offline();

        assert!(!monitor.is_online());
        assert_eq!(first.reason(), Some(AbortReason::Disconnect));
        assert_eq!(second.reason(), Some(AbortReason::Disconnect));
        assert_eq!(monitor.active_sessions(), 0);
        assert!(monitor.state().last_offline_at.is_some());
    }

    #[tokio::test]
    async fn test_repeated_offline_event_is_noop() {
        let (monitor, _rx) =
            NetworkMonitor::new(fast_config(), Arc::new(StaticProbe::new(true)), false);
        let handle = AbortHandle::new();
        monitor.register(handle.clone());

        monitor.on_platform_offline();

        assert!(!handle.is_aborted());
        assert_eq!(monitor.active_sessions(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_replays_all_queued_entries() {
        let (monitor, mut rx) =
            NetworkMonitor::new(fast_config(), Arc::new(StaticProbe::new(true)), false);
        monitor.enqueue(entry("a"));
        monitor.enqueue(entry("b"));
        monitor.enqueue(entry("c"));

        monitor.on_platform_online();
        assert_eq!(monitor.pending_len(), 0);

        let mut replayed = Vec::new();
        for _ in 0..3 {
            let e = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            replayed.push(e.model);
        }

        assert_eq!(replayed, vec!["a", "b", "c"]);
        assert_eq!(monitor.pending_len(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_flap_during_settle_requeues_snapshot() {
        let (monitor, mut rx) =
            NetworkMonitor::new(fast_config(), Arc::new(StaticProbe::new(true)), false);
        monitor.enqueue(entry("a"));
        monitor.enqueue(entry("b"));

        monitor.on_platform_online();
        monitor.on_platform_offline();
        monitor.enqueue(entry("c"));

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(monitor.pending_len(), 3);

        // Order is preserved: the snapshot goes back in front of newer sends.
        let models: Vec<String> = monitor
            .lock_inner()
            .pending
            .iter()
            .map(|e| e.model.clone())
            .collect();
        assert_eq!(models, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_probe_failure_forces_offline() {
        let probe = Arc::new(StaticProbe::new(false));
        let (monitor, _rx) = NetworkMonitor::new(fast_config(), probe, true);
        let handle = AbortHandle::new();
        monitor.register(handle.clone());

        assert!(!monitor.probe_now().await);

        assert!(!monitor.is_online());
        assert_eq!(handle.reason(), Some(AbortReason::Disconnect));
    }

    #[tokio::test]
    async fn test_probe_success_forces_online_and_records_ping() {
        let probe = Arc::new(StaticProbe::new(true));
        let (monitor, mut rx) = NetworkMonitor::new(fast_config(), probe, false);
        monitor.enqueue(entry("queued"));

        assert!(monitor.probe_now().await);

        assert!(monitor.is_online());
        assert!(monitor.state().last_successful_ping_at.is_some());
        let replayed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(replayed.model, "queued");
    }

    #[tokio::test]
    async fn test_polling_start_stop_idempotent() {
        let probe = Arc::new(StaticProbe::new(true));
        let (monitor, _rx) = NetworkMonitor::new(fast_config(), probe.clone(), true);

        monitor.start_polling();
        monitor.start_polling();
        assert!(monitor.is_polling());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(probe.calls() > 0);

        monitor.stop_polling();
        monitor.stop_polling();
        assert!(!monitor.is_polling());

        let calls = probe.calls();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(probe.calls(), calls);
    }

    #[tokio::test]
    async fn test_polling_detects_outage() {
        let probe = Arc::new(StaticProbe::new(true));
        let (monitor, _rx) = NetworkMonitor::new(fast_config(), probe.clone(), true);
        let mut changes = monitor.subscribe();

        monitor.start_polling();
        probe.set_reachable(false);

        tokio::time::timeout(Duration::from_secs(1), changes.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(!*changes.borrow());
        monitor.stop_polling();
    }

    #[tokio::test]
    async fn test_enqueue_while_online_replays_after_settle() {
        let (monitor, mut rx) =
            NetworkMonitor::new(fast_config(), Arc::new(StaticProbe::new(true)), true);

        monitor.enqueue(entry("late"));

        let replayed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(replayed.model, "late");
        assert_eq!(monitor.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_clears_everything() {
        let (monitor, _rx) =
            NetworkMonitor::new(fast_config(), Arc::new(StaticProbe::new(true)), false);
        let handle = AbortHandle::new();
        monitor.register(handle.clone());
        monitor.enqueue(entry("x"));
        monitor.start_polling();

        monitor.shutdown();

        assert!(!monitor.is_polling());
        assert_eq!(monitor.pending_len(), 0);
        assert_eq!(monitor.active_sessions(), 0);
        assert_eq!(handle.reason(), Some(AbortReason::User));
    }
}
