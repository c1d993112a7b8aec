// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Send orchestration
//!
//! Owns the lifecycle of every send: builds the request, runs the transport
//! under the retry engine, and decides whether a failure is reported, queued
//! for replay, or swallowed as a user stop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::chat::sink::{BufferSink, ChunkSink};
use crate::config::{ModelSettings, Settings};
use crate::error::Result;
use crate::llm::message::Message;
use crate::llm::request::RequestBuilder;
use crate::llm::retry::{with_retry, RetryPolicy};
use crate::llm::transport::{ChatTransport, HttpTransport};
use crate::network::{AbortHandle, AbortReason, NetworkMonitor, PendingRetryEntry, SessionId};

/// How a streaming send ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The stream finished normally
    Completed,
    /// The user stopped the stream; partial output stays with the sink
    Stopped,
    /// Connectivity was lost; the send will be replayed on reconnect
    Queued,
}

#[derive(Default)]
struct OrchestratorState {
    sessions: HashMap<SessionId, AbortHandle>,
    last_error: Option<String>,
}

/// Coordinates sends against the transport, retry engine and network monitor
pub struct ChatOrchestrator {
    builder: RequestBuilder,
    transport: Arc<dyn ChatTransport>,
    monitor: Arc<NetworkMonitor>,
    policy: RetryPolicy,
    state: Mutex<OrchestratorState>,
}

/// One in-flight send. Dropping it unregisters the abort handle everywhere.
struct StreamSession<'a> {
    owner: &'a ChatOrchestrator,
    id: SessionId,
    abort: AbortHandle,
    started_at: Instant,
}

impl Drop for StreamSession<'_> {
    fn drop(&mut self) {
        self.owner.monitor.unregister(self.id);
        self.owner.lock_state().sessions.remove(&self.id);
        tracing::debug!(
            "{} closed after {:.1}s",
            self.id,
            self.started_at.elapsed().as_secs_f64()
        );
    }
}

/// Sink wrapper tracking what the current attempt has delivered, so a retry
/// can tell the caller to discard partial text first
struct DeliveryTracker {
    inner: Arc<dyn ChunkSink>,
    attempt_delivered: AtomicBool,
    any_delivered: AtomicBool,
}

impl DeliveryTracker {
    fn new(inner: Arc<dyn ChunkSink>) -> Self {
        Self {
            inner,
            attempt_delivered: AtomicBool::new(false),
            any_delivered: AtomicBool::new(false),
        }
    }

    fn begin_attempt(&self) {
        if self.attempt_delivered.swap(false, Ordering::SeqCst) {
            tracing::debug!("Retrying after partial output, restarting sink");
            self.inner.on_restart();
        }
    }

    fn delivered_any(&self) -> bool {
        self.any_delivered.load(Ordering::SeqCst)
    }

    /// The current attempt handed text to a sink that cannot take it back
    fn holds_unrestartable_output(&self) -> bool {
        self.attempt_delivered.load(Ordering::SeqCst) && !self.inner.supports_restart()
    }
}

impl ChunkSink for DeliveryTracker {
    fn on_chunk(&self, chunk: &str) {
        self.attempt_delivered.store(true, Ordering::SeqCst);
        self.any_delivered.store(true, Ordering::SeqCst);
        self.inner.on_chunk(chunk);
    }

    fn on_restart(&self) {
        self.inner.on_restart();
    }

    fn supports_restart(&self) -> bool {
        self.inner.supports_restart()
    }
}

impl ChatOrchestrator {
    pub fn new(
        builder: RequestBuilder,
        transport: Arc<dyn ChatTransport>,
        monitor: Arc<NetworkMonitor>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            builder,
            transport,
            monitor,
            policy,
            state: Mutex::new(OrchestratorState::default()),
        }
    }

    /// Wire up the HTTP transport, routing table and retry policy from settings
    pub fn from_settings(settings: &Settings, monitor: Arc<NetworkMonitor>) -> Self {
        let transport = HttpTransport::new(settings.network.read_timeout(), monitor.clone());
        Self::new(
            RequestBuilder::from_settings(settings),
            Arc::new(transport),
            monitor,
            RetryPolicy::from(&settings.resilience),
        )
    }

    fn lock_state(&self) -> MutexGuard<'_, OrchestratorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Orchestrator state lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn monitor(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }

    /// Message of the last send that failed, cleared when a new send starts
    pub fn last_error(&self) -> Option<String> {
        self.lock_state().last_error.clone()
    }

    /// True while any send of this orchestrator is in flight
    pub fn is_loading(&self) -> bool {
        !self.lock_state().sessions.is_empty()
    }

    fn open_session(&self) -> StreamSession<'_> {
        let abort = AbortHandle::new();
        let id = self.monitor.register(abort.clone());
        self.lock_state().sessions.insert(id, abort.clone());
        tracing::debug!("{} opened", id);

        StreamSession {
            owner: self,
            id,
            abort,
            started_at: Instant::now(),
        }
    }

    /// Stream a reply for `messages`, forwarding each text delta to `sink`.
    ///
    /// A user stop yields `Ok(Stopped)` and a connectivity loss yields
    /// `Ok(Queued)`; any other failure is recorded in [`Self::last_error`]
    /// and returned.
    pub async fn send_streaming_message(
        &self,
        messages: Vec<Message>,
        model: &str,
        settings: &ModelSettings,
        sink: Arc<dyn ChunkSink>,
    ) -> Result<SendOutcome> {
        self.run(messages, model, settings, sink, false).await
    }

    /// Buffered variant: returns the full reply text. Connectivity losses are
    /// returned as errors rather than queued; a user stop returns the text
    /// received so far.
    pub async fn send_message(
        &self,
        messages: &[Message],
        model: &str,
        settings: &ModelSettings,
    ) -> Result<String> {
        self.set_error(None);
        let buffer = Arc::new(BufferSink::new());
        let session = self.open_session();
        let tracker = DeliveryTracker::new(buffer.clone());

        let result = self.attempt(&session, messages, model, settings, &tracker).await;
        drop(session);

        match result {
            Ok(()) => Ok(buffer.take()),
            Err(e) if e.is_user_abort() => {
                tracing::debug!("Buffered send stopped by user");
                Ok(buffer.take())
            }
            Err(e) => {
                self.set_error(Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        messages: Vec<Message>,
        model: &str,
        settings: &ModelSettings,
        sink: Arc<dyn ChunkSink>,
        restart_first: bool,
    ) -> Result<SendOutcome> {
        self.set_error(None);
        let session = self.open_session();

        if restart_first {
            sink.on_restart();
        }
        let tracker = DeliveryTracker::new(sink.clone());

        let result = self.attempt(&session, &messages, model, settings, &tracker).await;
        drop(session);

        match result {
            Ok(()) => Ok(SendOutcome::Completed),
            Err(e) if e.is_user_abort() => {
                tracing::debug!("Send stopped by user");
                Ok(SendOutcome::Stopped)
            }
            Err(e) if e.is_connectivity_loss() && !tracker.holds_unrestartable_output() => {
                tracing::info!("Connectivity lost during send ({}), queued for replay", e);
                self.monitor.enqueue(PendingRetryEntry {
                    messages,
                    model: model.to_string(),
                    settings: settings.clone(),
                    sink,
                    partial_output: tracker.delivered_any(),
                });
                Ok(SendOutcome::Queued)
            }
            Err(e) => {
                tracing::debug!("Send failed: {}", e);
                self.set_error(Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Build the request and drive it through the retry engine, racing the
    /// session's abort handle
    async fn attempt(
        &self,
        session: &StreamSession<'_>,
        messages: &[Message],
        model: &str,
        settings: &ModelSettings,
        tracker: &DeliveryTracker,
    ) -> Result<()> {
        let request = self.builder.build(messages, model, settings);
        let transport = &self.transport;
        let request = &request;
        let abort = &session.abort;

        // A failure after output the sink cannot discard ends the send
        // instead of going back to the retry engine.
        let operation = move || async move {
            tracker.begin_attempt();
            match transport.stream(request, abort, tracker).await {
                Err(e) if tracker.holds_unrestartable_output() => {
                    tracing::debug!("Not retrying after partial output: {}", e);
                    Ok(Err(e))
                }
                result => result.map(Ok),
            }
        };

        tokio::select! {
            biased;
            _ = abort.cancelled() => Err(abort.error()),
            result = with_retry(operation, &self.policy, &*self.monitor, "chat completion") => {
                result.and_then(|outcome| outcome)
            }
        }
    }

    fn set_error(&self, error: Option<String>) {
        self.lock_state().last_error = error;
    }

    /// Abort every send this orchestrator owns as a user stop. Does nothing
    /// when idle.
    pub fn stop_streaming(&self) {
        let sessions: Vec<(SessionId, AbortHandle)> =
            self.lock_state().sessions.drain().collect();

        for (id, handle) in sessions {
            tracing::debug!("Stopping {}", id);
            handle.abort(AbortReason::User);
            self.monitor.unregister(id);
        }
    }

    /// Re-send a queued entry as a fresh session
    async fn replay(&self, entry: PendingRetryEntry) {
        let PendingRetryEntry {
            messages,
            model,
            settings,
            sink,
            partial_output,
        } = entry;

        match self.run(messages, &model, &settings, sink, partial_output).await {
            Ok(outcome) => tracing::info!("Replayed send for {} ended: {:?}", model, outcome),
            Err(e) => tracing::warn!("Replayed send for {} failed: {}", model, e),
        }
    }

    /// Consume the monitor's replay channel. Each entry runs as its own task;
    /// the worker exits once the channel closes or the orchestrator is gone.
    pub fn spawn_replay_worker(
        self: &Arc<Self>,
        mut replay_rx: mpsc::UnboundedReceiver<PendingRetryEntry>,
    ) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(entry) = replay_rx.recv().await {
                let Some(orchestrator) = weak.upgrade() else {
                    break;
                };
                tokio::spawn(async move { orchestrator.replay(entry).await });
            }
            tracing::debug!("Replay worker stopped");
        })
    }
}

impl Drop for ChatOrchestrator {
    fn drop(&mut self) {
        self.stop_streaming();
    }
}
