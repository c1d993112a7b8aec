// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Message types for LLM interactions
//!
//! Defines the message structures kept in conversation history and the
//! neutral input handed to the request builder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique identifier for the message
    pub id: Uuid,

    /// Content of the message
    pub content: String,

    /// Role of the message sender
    pub role: Role,

    /// When the message was created
    pub timestamp: DateTime<Utc>,

    /// Model that produced the message (assistant messages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// How the front-end should render the content
    #[serde(default)]
    pub kind: MessageKind,
}

/// Role of the message sender
///
/// Unknown roles found in stored history are read as `Assistant`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt
    System,
    /// User message
    User,
    /// Assistant response
    #[serde(other)]
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Rendering hint carried with each message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Code,
}

impl Message {
    /// Create a message with a fresh id and the current time
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            role,
            timestamp: Utc::now(),
            model: None,
            kind: MessageKind::Text,
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Tag the message with the model that produced it
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// An assistant turn with no text; left behind by failed or aborted sends
    pub fn is_blank_assistant(&self) -> bool {
        self.role == Role::Assistant && self.content.trim().is_empty()
    }
}
