// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! chatwire - streaming chat client core for OpenAI-compatible LLM APIs.
//!
//! This crate exposes the runtime used by the `chatwire` CLI (`src/main.rs`)
//! and by any other front-end that wants resilient streaming chat.
//!
//! Architecture highlights:
//! - `llm`: request building, model routing, SSE transport and retry/backoff
//! - `network`: connectivity monitor, abort handles and the pending-retry queue
//! - `chat`: the orchestrator that ties a send to its session, retries and queueing
//! - `history`: local conversation persistence
//! - `config`: user settings stored as JSON
//!
//! A typical embedding constructs one [`network::NetworkMonitor`], injects it
//! into a [`chat::ChatOrchestrator`], and starts the replay worker so sends
//! queued while offline are re-issued on reconnect.

pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod network;

pub use error::{ApiError, ChatError, Result};
