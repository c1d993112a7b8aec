// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use crate::error::{ChatError, Result};
use crate::llm::routing::{ProviderEndpoint, ProviderKind};

use super::{ProviderConfig, Settings, SystemPromptMode};

impl Settings {
    fn provider_config(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::DeepSeek => &self.providers.deepseek,
            ProviderKind::OpenAi => &self.providers.openai,
        }
    }

    /// Get the API key for a provider, checking env var first.
    pub fn api_key_for(&self, kind: ProviderKind) -> Option<String> {
        let config = self.provider_config(kind);
        let env_name = config
            .api_key_env
            .as_deref()
            .unwrap_or_else(|| kind.default_api_key_env());

        // Priority: env var > config file.
        std::env::var(env_name)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| config.api_key.clone())
    }

    /// Resolve the chat completions URL and key for a provider.
    pub fn provider_endpoint(&self, kind: ProviderKind) -> ProviderEndpoint {
        let base_url = self
            .provider_config(kind)
            .base_url
            .as_deref()
            .unwrap_or_else(|| kind.default_base_url());

        ProviderEndpoint {
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: self.api_key_for(kind).unwrap_or_default(),
        }
    }

    /// Check if the given provider has a usable API key.
    pub fn is_provider_configured(&self, kind: ProviderKind) -> bool {
        self.api_key_for(kind).is_some()
    }

    /// Reject values the API or the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        let m = &self.model;
        check_range("model.temperature", m.temperature, 0.0, 2.0)?;
        check_range("model.top_p", m.top_p, 0.0, 1.0)?;
        check_range("model.presence_penalty", m.presence_penalty, -2.0, 2.0)?;
        check_range("model.frequency_penalty", m.frequency_penalty, -2.0, 2.0)?;
        if m.model.trim().is_empty() {
            return Err(ChatError::Config("model.model must not be empty".to_string()));
        }

        let r = &self.resilience;
        if r.max_attempts == 0 {
            return Err(ChatError::Config(
                "resilience.max_attempts must be at least 1".to_string(),
            ));
        }
        if r.base_delay_ms > r.max_delay_ms {
            return Err(ChatError::Config(format!(
                "resilience.base_delay_ms ({}) exceeds max_delay_ms ({})",
                r.base_delay_ms, r.max_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&r.jitter) {
            return Err(ChatError::Config(format!(
                "resilience.jitter must be between 0 and 1, got {}",
                r.jitter
            )));
        }

        let n = &self.network;
        for (name, value) in [
            ("network.poll_interval_ms", n.poll_interval_ms),
            ("network.probe_timeout_ms", n.probe_timeout_ms),
            ("network.read_timeout_ms", n.read_timeout_ms),
        ] {
            if value == 0 {
                return Err(ChatError::Config(format!("{} must be greater than 0", name)));
            }
        }

        Ok(())
    }

    /// Update a single dotted key (e.g. `model.temperature`) from a string.
    /// The change is validated before it is kept.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();
        match key {
            "model" | "model.model" => updated.model.model = value.to_string(),
            "model.temperature" => updated.model.temperature = parse(key, value)?,
            "model.top_p" => updated.model.top_p = parse(key, value)?,
            "model.presence_penalty" => updated.model.presence_penalty = parse(key, value)?,
            "model.frequency_penalty" => updated.model.frequency_penalty = parse(key, value)?,
            "model.max_tokens" => updated.model.max_tokens = parse(key, value)?,
            "providers.deepseek.api_key" => {
                updated.providers.deepseek.api_key = Some(value.to_string())
            }
            "providers.deepseek.base_url" => {
                updated.providers.deepseek.base_url = Some(value.to_string())
            }
            "providers.openai.api_key" => {
                updated.providers.openai.api_key = Some(value.to_string())
            }
            "providers.openai.base_url" => {
                updated.providers.openai.base_url = Some(value.to_string())
            }
            "resilience.max_attempts" => updated.resilience.max_attempts = parse(key, value)?,
            "resilience.base_delay_ms" => updated.resilience.base_delay_ms = parse(key, value)?,
            "resilience.max_delay_ms" => updated.resilience.max_delay_ms = parse(key, value)?,
            "resilience.jitter" => updated.resilience.jitter = parse(key, value)?,
            "network.poll_interval_ms" => updated.network.poll_interval_ms = parse(key, value)?,
            "network.probe_timeout_ms" => updated.network.probe_timeout_ms = parse(key, value)?,
            "network.probe_url" => updated.network.probe_url = value.to_string(),
            "network.settle_delay_ms" => updated.network.settle_delay_ms = parse(key, value)?,
            "network.read_timeout_ms" => updated.network.read_timeout_ms = parse(key, value)?,
            "conversation.auto_generate_title" => {
                updated.conversation.auto_generate_title = parse(key, value)?
            }
            "conversation.system_prompt_mode" => {
                updated.conversation.system_prompt_mode = match value {
                    "replace" => SystemPromptMode::Replace,
                    "prepend_if_absent" => SystemPromptMode::PrependIfAbsent,
                    other => {
                        return Err(ChatError::InvalidInput(format!(
                            "unknown system prompt mode '{}' (expected replace or prepend_if_absent)",
                            other
                        )))
                    }
                }
            }
            other => {
                return Err(ChatError::InvalidInput(format!("unknown setting '{}'", other)));
            }
        }

        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

fn check_range(name: &str, value: f32, min: f32, max: f32) -> Result<()> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ChatError::Config(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )))
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ChatError::InvalidInput(format!("invalid value '{}' for {}", value, key)))
}
