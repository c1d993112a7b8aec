// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Model routing
//!
//! Maps the model name a user picks to a provider endpoint, the model name
//! sent on the wire, and the system prompt template for its family.

use chrono::{DateTime, Local};

use crate::config::Settings;

/// Model used when none is configured
pub const DEFAULT_MODEL: &str = "deepseek";

/// Wire model for the DeepSeek chat family
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// Wire model for the DeepSeek reasoning family
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// OpenAI-compatible providers the client can talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    DeepSeek,
    OpenAi,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::OpenAi => "openai",
        }
    }

    /// Environment variable read for the API key when none is configured
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::DeepSeek => "DEEPSEEK_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::DeepSeek => "https://api.deepseek.com/v1",
            ProviderKind::OpenAi => "https://api.openai.com/v1",
        }
    }
}

/// Resolved chat completions endpoint for one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoint {
    pub url: String,
    pub api_key: String,
}

/// Endpoints for every provider, resolved once from settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTable {
    pub deepseek: ProviderEndpoint,
    pub openai: ProviderEndpoint,
}

impl ProviderTable {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            deepseek: settings.provider_endpoint(ProviderKind::DeepSeek),
            openai: settings.provider_endpoint(ProviderKind::OpenAi),
        }
    }

    pub fn endpoint(&self, kind: ProviderKind) -> &ProviderEndpoint {
        match kind {
            ProviderKind::DeepSeek => &self.deepseek,
            ProviderKind::OpenAi => &self.openai,
        }
    }
}

/// Family a model belongs to; decides the system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    ChatGpt,
    DeepSeek,
    DeepSeekReasoner,
    Generic,
}

impl ModelFamily {
    pub fn for_model(model: &str) -> Self {
        let model = model.trim();
        match model {
            "deepseek" | DEEPSEEK_CHAT => ModelFamily::DeepSeek,
            DEEPSEEK_REASONER | "deepseek-r1" => ModelFamily::DeepSeekReasoner,
            m if m.starts_with("gpt-") => ModelFamily::ChatGpt,
            _ => ModelFamily::Generic,
        }
    }

    /// Render the system prompt for `model` at `now`
    pub fn system_prompt(&self, model: &str, now: DateTime<Local>) -> String {
        let time = format_time(now);
        match self {
            ModelFamily::ChatGpt => format!(
                "You are ChatGPT, a large language model trained by OpenAI.\n\
                 Knowledge cutoff: 2021-09\n\
                 Current model: {model}\n\
                 Current time: {time}\n\
                 Latex inline: \\(x^2\\) \n\
                 Latex block: $$e=mc^2$$\n\n"
            ),
            ModelFamily::DeepSeek | ModelFamily::DeepSeekReasoner => format!(
                "You are DeepSeek, a large language model trained by DeepSeek.\n\
                 Current model: {model}\n\
                 Current time: {time}\n\
                 Latex inline: \\(x^2\\) \n\
                 Latex block: $$e=mc^2$$\n\n"
            ),
            ModelFamily::Generic => format!(
                "You are a helpful AI assistant.\n\
                 Current model: {model}\n\
                 Current time: {time}\n\n"
            ),
        }
    }
}

fn format_time(now: DateTime<Local>) -> String {
    now.format("%a %b %d %Y %H:%M:%S GMT%z").to_string()
}

/// Where a requested model is sent and how it is named on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub provider: ProviderKind,
    pub wire_model: String,
    pub family: ModelFamily,
}

/// Route a user-facing model name. Unknown models go to DeepSeek chat.
pub fn route(model: &str) -> Route {
    let family = ModelFamily::for_model(model);
    let (provider, wire_model) = match family {
        ModelFamily::ChatGpt => (ProviderKind::OpenAi, model.trim().to_string()),
        ModelFamily::DeepSeekReasoner => (ProviderKind::DeepSeek, DEEPSEEK_REASONER.to_string()),
        ModelFamily::DeepSeek | ModelFamily::Generic => {
            (ProviderKind::DeepSeek, DEEPSEEK_CHAT.to_string())
        }
    };

    Route {
        provider,
        wire_model,
        family,
    }
}

/// Models listed by the front-end
pub const KNOWN_MODELS: &[&str] = &[
    "deepseek",
    "deepseek-reasoner",
    "gpt-3.5-turbo",
    "gpt-4",
];
