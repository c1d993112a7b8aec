// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation store implementation
//!
//! Keeps every conversation and the current selection in a single JSON file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{ChatError, Result};
use crate::llm::message::{Message, Role};

/// Title given to conversations before one is derived
pub const DEFAULT_TITLE: &str = "New Chat";

const PREVIEW_CHARS: usize = 50;
const TITLE_CHARS: usize = 20;
const MIN_TITLE_CHARS: usize = 3;

/// A stored conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    /// Preview of the most recent message
    pub last_message: String,
    /// When the conversation last changed
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            last_message: String::new(),
            timestamp: Utc::now(),
            messages: Vec::new(),
        }
    }

    fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreFile {
    current_id: Uuid,
    conversations: Vec<Conversation>,
}

impl Default for StoreFile {
    fn default() -> Self {
        let conversation = Conversation::new(DEFAULT_TITLE);
        Self {
            current_id: conversation.id,
            conversations: vec![conversation],
        }
    }
}

/// Persistent conversation list with a current selection
pub struct ConversationStore {
    path: PathBuf,
    data: StoreFile,
    auto_title: bool,
}

impl ConversationStore {
    /// Open the store at the default location
    pub fn open() -> Result<Self> {
        Self::open_at(&Settings::conversations_path())
    }

    /// Open or create a store at `path`. A corrupt file is replaced by a
    /// fresh store with one empty conversation.
    pub fn open_at(path: &Path) -> Result<Self> {
        let mut data = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match serde_json::from_str::<StoreFile>(&content) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(
                        "Conversation file {} is unreadable ({}), starting fresh",
                        path.display(),
                        e
                    );
                    StoreFile::default()
                }
            }
        } else {
            StoreFile::default()
        };

        if data.conversations.is_empty() {
            data = StoreFile::default();
        } else if !data.conversations.iter().any(|c| c.id == data.current_id) {
            data.current_id = data.conversations[0].id;
        }

        Ok(Self {
            path: path.to_path_buf(),
            data,
            auto_title: true,
        })
    }

    /// Enable or disable deriving titles from the first user message
    pub fn with_auto_title(mut self, enabled: bool) -> Self {
        self.auto_title = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    /// All conversations, newest first
    pub fn list(&self) -> &[Conversation] {
        &self.data.conversations
    }

    pub fn get(&self, id: Uuid) -> Option<&Conversation> {
        self.data.conversations.iter().find(|c| c.id == id)
    }

    /// Resolve a full ID or a unique ID prefix
    pub fn resolve_id(&self, query: &str) -> Result<Uuid> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Err(ChatError::InvalidInput("conversation ID is empty".to_string()));
        }

        let matches: Vec<Uuid> = self
            .data
            .conversations
            .iter()
            .map(|c| c.id)
            .filter(|id| id.to_string().starts_with(&query))
            .collect();

        match matches.as_slice() {
            [id] => Ok(*id),
            [] => Err(ChatError::History(format!("no conversation matches '{}'", query))),
            _ => Err(ChatError::History(format!(
                "'{}' matches {} conversations, use a longer prefix",
                query,
                matches.len()
            ))),
        }
    }

    fn get_mut(&mut self, id: Uuid) -> Result<&mut Conversation> {
        self.data
            .conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ChatError::History(format!("conversation {} not found", id)))
    }

    pub fn current_id(&self) -> Uuid {
        self.data.current_id
    }

    pub fn current(&self) -> Option<&Conversation> {
        self.get(self.data.current_id)
    }

    /// Select a conversation
    pub fn set_current(&mut self, id: Uuid) -> Result<()> {
        if self.get(id).is_none() {
            return Err(ChatError::History(format!("conversation {} not found", id)));
        }
        self.data.current_id = id;
        self.save()
    }

    /// Insert a fresh conversation at the front and select it
    pub fn create_new(&mut self) -> Result<Uuid> {
        let conversation = Conversation::new(DEFAULT_TITLE);
        let id = conversation.id;
        self.data.conversations.insert(0, conversation);
        self.data.current_id = id;
        self.save()?;
        Ok(id)
    }

    /// Start a conversation from a persona: its prompt becomes the system
    /// message, followed by a greeting in the persona's voice
    pub fn create_masked(&mut self, name: &str, description: &str, prompt: &str) -> Result<Uuid> {
        let conversation = Conversation::new(name);
        let id = conversation.id;
        self.data.conversations.insert(0, conversation);
        self.data.current_id = id;

        self.add_message(id, Message::system(prompt))?;
        self.add_message(
            id,
            Message::assistant(format!(
                "Hello! I'm {}, {}. How can I help you?",
                name, description
            )),
        )?;
        Ok(id)
    }

    /// Append a message, refresh the preview, and derive the title from the
    /// first user message
    pub fn add_message(&mut self, id: Uuid, message: Message) -> Result<()> {
        let auto_title = self.auto_title;
        let conversation = self.get_mut(id)?;

        conversation.last_message = preview(&message.content);
        conversation.timestamp = Utc::now();
        let is_user = message.role == Role::User;
        conversation.messages.push(message);

        if auto_title && is_user && conversation.user_message_count() == 1 {
            let first = conversation.messages.iter().find(|m| m.role == Role::User);
            if let Some(title) = first.and_then(|m| extract_title(&m.content)) {
                conversation.title = title;
            }
        }

        self.save()
    }

    /// Delete a conversation. Deleting the current one selects the first
    /// remaining conversation, or a fresh one when none remain.
    pub fn delete(&mut self, id: Uuid) -> Result<bool> {
        let initial_len = self.data.conversations.len();
        self.data.conversations.retain(|c| c.id != id);
        if self.data.conversations.len() == initial_len {
            return Ok(false);
        }

        if self.data.current_id == id {
            match self.data.conversations.first() {
                Some(first) => self.data.current_id = first.id,
                None => {
                    self.create_new()?;
                    return Ok(true);
                }
            }
        }

        self.save()?;
        Ok(true)
    }
}

/// First 50 characters of a message, with `...` when cut
pub fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

fn keep_in_title(c: char) -> bool {
    matches!(c,
        '\u{4e00}'..='\u{9fa5}'
        | '\u{3040}'..='\u{309f}'
        | '\u{30a0}'..='\u{30ff}')
        || c.is_ascii_alphanumeric()
        || c.is_whitespace()
}

/// Derive a title from message text: strip symbols and emoji, keep the
/// first 20 characters. Returns `None` when fewer than 3 remain.
pub fn extract_title(content: &str) -> Option<String> {
    let cleaned: String = content.chars().filter(|c| keep_in_title(*c)).collect();
    let head: String = cleaned.chars().take(TITLE_CHARS).collect();
    let title = head.trim();

    if title.chars().count() < MIN_TITLE_CHARS {
        return None;
    }

    if cleaned.chars().count() > TITLE_CHARS {
        Some(format!("{}...", title))
    } else {
        Some(title.to_string())
    }
}
