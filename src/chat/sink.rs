// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chunk sinks
//!
//! A sink receives streamed text as it arrives. Any `Fn(&str)` closure is a
//! sink. Closures cannot take text back, so once one has received chunks a
//! failed send is reported instead of being retried or replayed. Sinks that
//! can discard partial output implement `on_restart` and return `true` from
//! `supports_restart`.

use std::sync::{Mutex, MutexGuard};

/// Receiver for streamed text chunks of one send
pub trait ChunkSink: Send + Sync {
    /// Called once per text delta, in arrival order
    fn on_chunk(&self, chunk: &str);

    /// Called before a send is re-attempted after it already delivered
    /// chunks. Partial text shown so far should be discarded.
    fn on_restart(&self) {}

    /// Whether `on_restart` really discards partial text. When false, a send
    /// is never re-attempted after this sink received chunks.
    fn supports_restart(&self) -> bool {
        false
    }
}

impl<F> ChunkSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_chunk(&self, chunk: &str) {
        self(chunk)
    }
}

/// Sink that accumulates the full text of a send
#[derive(Debug, Default)]
pub struct BufferSink {
    text: Mutex<String>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        match self.text.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Buffer sink lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Text received so far
    pub fn contents(&self) -> String {
        self.lock().clone()
    }

    /// Take the text, leaving the buffer empty
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.lock())
    }
}

impl ChunkSink for BufferSink {
    fn on_chunk(&self, chunk: &str) {
        self.lock().push_str(chunk);
    }

    fn on_restart(&self) {
        self.lock().clear();
    }

    fn supports_restart(&self) -> bool {
        true
    }
}
