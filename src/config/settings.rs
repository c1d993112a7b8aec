// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for chatwire
//!
//! Handles loading and saving settings from ~/.chatwire/settings.json

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::llm::request::{
    DEFAULT_FREQUENCY_PENALTY, DEFAULT_PRESENCE_PENALTY, DEFAULT_TEMPERATURE, DEFAULT_TOP_P,
};
use crate::llm::routing::DEFAULT_MODEL;

mod io;
mod validation;

/// Main settings structure, stored in ~/.chatwire/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Model selection and sampling parameters
    #[serde(default)]
    pub model: ModelSettings,

    /// Provider endpoints and credentials
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Retry settings for API calls
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Connectivity monitoring and stream timeouts
    #[serde(default)]
    pub network: NetworkConfig,

    /// Conversation handling
    #[serde(default)]
    pub conversation: ConversationConfig,
}

/// Model selection and sampling parameters sent with every request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelSettings {
    /// Model identifier as chosen by the user (e.g. "deepseek", "gpt-4")
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_presence_penalty")]
    pub presence_penalty: f32,

    #[serde(default = "default_frequency_penalty")]
    pub frequency_penalty: f32,

    /// Kept for front-ends that cap output; not sent on the wire
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            presence_penalty: default_presence_penalty(),
            frequency_penalty: default_frequency_penalty(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Endpoint and credentials for one provider. Unset fields fall back to
/// the provider's built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProviderConfig {
    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Base URL for API (for proxies and compatible gateways)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Configuration for LLM providers
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub deepseek: ProviderConfig,

    #[serde(default)]
    pub openai: ProviderConfig,
}

/// Retry configuration for API calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResilienceConfig {
    /// Maximum number of attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay in milliseconds for exponential backoff
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (cap for backoff)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter percentage (0.0 to 1.0) for randomizing delays
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

/// Connectivity monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Interval between reachability probes
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Timeout for a single probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// URL probed with a HEAD request
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    /// Pause after reconnecting before queued sends are replayed
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Deadline for a single read from the response stream
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_url: default_probe_url(),
            settle_delay_ms: default_settle_delay_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl NetworkConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// How the synthesized system prompt treats system messages already present
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SystemPromptMode {
    /// Drop existing system messages; the model prompt always wins
    #[default]
    Replace,
    /// Legacy behaviour: only add the model prompt when none is present
    PrependIfAbsent,
}

/// Conversation handling settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationConfig {
    /// Derive a title from the first user message
    #[serde(default = "default_true")]
    pub auto_generate_title: bool,

    #[serde(default)]
    pub system_prompt_mode: SystemPromptMode,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            auto_generate_title: true,
            system_prompt_mode: SystemPromptMode::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_top_p() -> f32 {
    DEFAULT_TOP_P
}

fn default_presence_penalty() -> f32 {
    DEFAULT_PRESENCE_PENALTY
}

fn default_frequency_penalty() -> f32 {
    DEFAULT_FREQUENCY_PENALTY
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    10000
}

fn default_jitter() -> f64 {
    0.0
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_probe_timeout_ms() -> u64 {
    1500
}

fn default_probe_url() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_read_timeout_ms() -> u64 {
    30000
}
