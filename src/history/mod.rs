// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation history
//!
//! Stores conversations locally, derives titles from the first user message,
//! and keeps track of the current conversation.

pub mod store;

pub use store::{Conversation, ConversationStore, DEFAULT_TITLE};
