// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Request building
//!
//! Turns conversation messages plus model settings into the JSON payload for
//! an OpenAI-compatible chat completions endpoint.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::config::{ModelSettings, Settings, SystemPromptMode};
use crate::llm::message::{Message, Role};
use crate::llm::routing::{route, ProviderTable};

pub const DEFAULT_TEMPERATURE: f32 = 0.5;
pub const DEFAULT_TOP_P: f32 = 1.0;
pub const DEFAULT_PRESENCE_PENALTY: f32 = 0.0;
pub const DEFAULT_FREQUENCY_PENALTY: f32 = 0.0;

/// A single `{role, content}` entry on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

/// Chat completions request body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub stream: bool,
}

/// Everything the transport needs to issue one request
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub url: String,
    pub api_key: String,
    pub body: ChatRequest,
}

/// Builds provider requests from conversation messages
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    providers: ProviderTable,
    system_prompt_mode: SystemPromptMode,
}

impl RequestBuilder {
    pub fn new(providers: ProviderTable, system_prompt_mode: SystemPromptMode) -> Self {
        Self {
            providers,
            system_prompt_mode,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            ProviderTable::from_settings(settings),
            settings.conversation.system_prompt_mode,
        )
    }

    pub fn providers(&self) -> &ProviderTable {
        &self.providers
    }

    /// Build a request stamped with the current local time
    pub fn build(
        &self,
        messages: &[Message],
        model: &str,
        settings: &ModelSettings,
    ) -> PreparedRequest {
        self.build_at(messages, model, settings, Local::now())
    }

    /// Build a request with an explicit clock. Identical inputs produce
    /// identical output.
    pub fn build_at(
        &self,
        messages: &[Message],
        model: &str,
        settings: &ModelSettings,
        now: DateTime<Local>,
    ) -> PreparedRequest {
        let route = route(model);

        let mut wire: Vec<WireMessage> = messages
            .iter()
            .filter(|m| !m.is_blank_assistant())
            .map(|m| WireMessage {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();

        let has_system = wire.iter().any(|m| m.role == Role::System);
        let insert_prompt = match self.system_prompt_mode {
            SystemPromptMode::Replace => {
                wire.retain(|m| m.role != Role::System);
                true
            }
            SystemPromptMode::PrependIfAbsent => !has_system,
        };

        if insert_prompt {
            wire.insert(
                0,
                WireMessage {
                    role: Role::System,
                    content: route.family.system_prompt(model, now),
                },
            );
        }

        let endpoint = self.providers.endpoint(route.provider);
        tracing::debug!(
            "Routing model '{}' to {} as '{}'",
            model,
            route.provider.name(),
            route.wire_model
        );

        PreparedRequest {
            url: endpoint.url.clone(),
            api_key: endpoint.api_key.clone(),
            body: ChatRequest {
                messages: wire,
                model: route.wire_model,
                temperature: settings.temperature,
                top_p: settings.top_p,
                presence_penalty: settings.presence_penalty,
                frequency_penalty: settings.frequency_penalty,
                stream: true,
            },
        }
    }
}
