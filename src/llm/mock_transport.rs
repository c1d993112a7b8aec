// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Scripted transport for testing
//!
//! Plays back pre-configured chunks, delays and failures instead of making
//! real API calls. Each call consumes the next script; once the scripts run
//! out the last one is repeated.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::chat::ChunkSink;
use crate::error::{ApiError, ChatError, Result};
use crate::llm::request::PreparedRequest;
use crate::llm::transport::ChatTransport;
use crate::network::AbortHandle;

/// Failure a script can end with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedFailure {
    Http { status: u16, message: String },
    Network(String),
    NoBody,
    Unavailable,
    ReadTimeout,
}

impl From<&ScriptedFailure> for ChatError {
    fn from(failure: &ScriptedFailure) -> Self {
        let api = match failure {
            ScriptedFailure::Http { status, message } => ApiError::Http {
                status: *status,
                message: message.clone(),
            },
            ScriptedFailure::Network(message) => ApiError::Network(message.clone()),
            ScriptedFailure::NoBody => ApiError::NoBody,
            ScriptedFailure::Unavailable => ApiError::NetworkUnavailable,
            ScriptedFailure::ReadTimeout => ApiError::ReadTimeout(Duration::from_secs(30)),
        };
        ChatError::Api(api)
    }
}

/// One step of a scripted response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Deliver a text delta
    Chunk(String),
    /// Pause before the next step
    Delay(Duration),
    /// End the attempt with an error
    Fail(ScriptedFailure),
    /// Block until the session is aborted
    Stall,
}

/// A transport that replays scripted attempts
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    scripts: Arc<Mutex<Vec<Vec<ScriptStep>>>>,
    call_count: Arc<AtomicUsize>,
    recorded_requests: Arc<Mutex<Vec<PreparedRequest>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call streams these chunks and succeeds
    pub fn with_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new().then(chunks.into_iter().map(|c| ScriptStep::Chunk(c.into())).collect())
    }

    /// Append a script for the next unscripted call
    pub fn then(self, steps: Vec<ScriptStep>) -> Self {
        lock(&self.scripts).push(steps);
        self
    }

    /// Append a script that fails immediately
    pub fn then_fail(self, failure: ScriptedFailure) -> Self {
        self.then(vec![ScriptStep::Fail(failure)])
    }

    /// Number of times `stream` was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn recorded_requests(&self) -> Vec<PreparedRequest> {
        lock(&self.recorded_requests).clone()
    }

    pub fn last_request(&self) -> Option<PreparedRequest> {
        lock(&self.recorded_requests).last().cloned()
    }

    fn next_script(&self) -> Vec<ScriptStep> {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst);
        let scripts = lock(&self.scripts);
        if scripts.is_empty() {
            Vec::new()
        } else {
            scripts[count.min(scripts.len() - 1)].clone()
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Scripted transport lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn stream(
        &self,
        request: &PreparedRequest,
        abort: &AbortHandle,
        sink: &dyn ChunkSink,
    ) -> Result<()> {
        lock(&self.recorded_requests).push(request.clone());
        let script = self.next_script();

        for step in script {
            abort.check()?;
            match step {
                ScriptStep::Chunk(text) => sink.on_chunk(&text),
                ScriptStep::Delay(duration) => {
                    tokio::select! {
                        _ = abort.cancelled() => return Err(abort.error()),
                        _ = tokio::time::sleep(duration) => {}
                    }
                }
                ScriptStep::Fail(failure) => return Err((&failure).into()),
                ScriptStep::Stall => {
                    abort.cancelled().await;
                    return Err(abort.error());
                }
            }
        }

        abort.check()
    }
}
