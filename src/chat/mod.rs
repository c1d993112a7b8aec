// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat orchestration
//!
//! Session control for streamed sends and the sinks that receive their output.

mod orchestrator;
mod sink;

pub use orchestrator::{ChatOrchestrator, SendOutcome};
pub use sink::{BufferSink, ChunkSink};
