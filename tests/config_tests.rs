// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::time::Duration;

use chatwire::config::{Settings, SystemPromptMode};
use chatwire::llm::RetryPolicy;
use tempfile::TempDir;

#[test]
fn test_settings_default_values() {
    let settings = Settings::default();

    // Check default configuration values
    assert_eq!(settings.model.model, "deepseek");
    assert!((settings.model.temperature - 0.5).abs() < f32::EPSILON);
    assert!((settings.model.top_p - 1.0).abs() < f32::EPSILON);
    assert_eq!(settings.model.presence_penalty, 0.0);
    assert_eq!(settings.model.frequency_penalty, 0.0);
    assert!(settings.conversation.auto_generate_title);
    assert_eq!(
        settings.conversation.system_prompt_mode,
        SystemPromptMode::Replace
    );
}

#[test]
fn test_settings_network_defaults() {
    let settings = Settings::default();
    assert!(settings.network.poll_interval() > Duration::ZERO);
    assert!(settings.network.probe_timeout() > Duration::ZERO);
    assert!(settings.network.read_timeout() > Duration::ZERO);
    assert!(settings.network.probe_url.starts_with("http"));
}

#[test]
fn test_partial_file_fills_in_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{ "model": { "model": "gpt-4", "temperature": 0.9 }, "network": { "read_timeout_ms": 5000 } }"#,
    )
    .unwrap();

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.model.model, "gpt-4");
    assert!((settings.model.temperature - 0.9).abs() < f32::EPSILON);
    assert!((settings.model.top_p - 1.0).abs() < f32::EPSILON);
    assert_eq!(settings.network.read_timeout(), Duration::from_millis(5000));
    assert_eq!(settings.resilience, Settings::default().resilience);
}

#[test]
fn test_invalid_file_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");

    std::fs::write(&path, "{ not json").unwrap();
    assert!(Settings::load_from(&path).is_err());

    std::fs::write(&path, r#"{ "model": { "top_p": 4.0 } }"#).unwrap();
    assert!(Settings::load_from(&path).is_err());
}

#[test]
fn test_set_then_save_persists_change() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("settings.json");

    let mut settings = Settings::default();
    settings.set_value("network.read_timeout_ms", "12000").unwrap();
    settings.set_value("resilience.max_attempts", "5").unwrap();
    settings.save_to(&path).unwrap();

    let loaded = Settings::load_from(&path).unwrap();
    assert_eq!(loaded.network.read_timeout_ms, 12000);
    assert_eq!(loaded.resilience.max_attempts, 5);
}

#[test]
fn test_reset_overwrites_customized_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");

    let mut settings = Settings::default();
    settings.set_value("model", "gpt-3.5-turbo").unwrap();
    settings.save_to(&path).unwrap();

    let reset = Settings::reset_at(&path).unwrap();
    assert_eq!(reset, Settings::default());
    assert_eq!(Settings::load_from(&path).unwrap(), Settings::default());
}

#[test]
fn test_retry_policy_follows_resilience_settings() {
    let mut settings = Settings::default();
    settings.resilience.max_attempts = 4;
    settings.resilience.base_delay_ms = 200;
    settings.resilience.max_delay_ms = 1000;

    let policy = RetryPolicy::from(&settings.resilience);
    assert_eq!(policy.max_attempts, 4);
    assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
    assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
    assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(1000));
    assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(1000));
}
