// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use chatwire::config::{ModelSettings, SystemPromptMode};
use chatwire::llm::{
    Message, ModelFamily, ProviderEndpoint, ProviderTable, RequestBuilder, Role,
};
use chrono::{DateTime, Local, TimeZone};
use proptest::prelude::*;

fn table() -> ProviderTable {
    ProviderTable {
        deepseek: ProviderEndpoint {
            url: "https://deepseek.test/chat/completions".to_string(),
            api_key: "ds-key".to_string(),
        },
        openai: ProviderEndpoint {
            url: "https://openai.test/v1/chat/completions".to_string(),
            api_key: "oa-key".to_string(),
        },
    }
}

fn fixed_time() -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::System), Just(Role::User), Just(Role::Assistant)]
}

fn arb_content() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("   ".to_string()),
        "[a-zA-Z0-9 ?!.]{1,40}",
    ]
}

fn arb_message() -> impl Strategy<Value = Message> {
    (arb_role(), arb_content()).prop_map(|(role, content)| Message::new(role, content))
}

fn arb_model() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("deepseek".to_string()),
        Just("deepseek-reasoner".to_string()),
        Just("gpt-4".to_string()),
        Just("gpt-3.5-turbo".to_string()),
        Just("mistral-large".to_string()),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_exactly_one_system_message_first(
        messages in prop::collection::vec(arb_message(), 0..12),
        model in arb_model(),
    ) {
        let builder = RequestBuilder::new(table(), SystemPromptMode::Replace);
        let request = builder.build_at(&messages, &model, &ModelSettings::default(), fixed_time());

        let wire = &request.body.messages;
        let system_count = wire.iter().filter(|m| m.role == Role::System).count();
        prop_assert_eq!(system_count, 1);
        prop_assert_eq!(wire[0].role, Role::System);
        prop_assert_eq!(
            &wire[0].content,
            &ModelFamily::for_model(&model).system_prompt(&model, fixed_time())
        );
    }

    #[test]
    fn prop_blank_assistant_messages_are_dropped(
        messages in prop::collection::vec(arb_message(), 0..12),
        model in arb_model(),
    ) {
        let builder = RequestBuilder::new(table(), SystemPromptMode::Replace);
        let request = builder.build_at(&messages, &model, &ModelSettings::default(), fixed_time());

        prop_assert!(request
            .body
            .messages
            .iter()
            .all(|m| !(m.role == Role::Assistant && m.content.trim().is_empty())));

        // Everything else keeps its order
        let expected: Vec<(Role, String)> = messages
            .iter()
            .filter(|m| m.role != Role::System && !m.is_blank_assistant())
            .map(|m| (m.role, m.content.clone()))
            .collect();
        let actual: Vec<(Role, String)> = request.body.messages[1..]
            .iter()
            .map(|m| (m.role, m.content.clone()))
            .collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn prop_rebuilding_a_request_changes_nothing(
        messages in prop::collection::vec(arb_message(), 0..12),
        model in arb_model(),
    ) {
        let builder = RequestBuilder::new(table(), SystemPromptMode::Replace);
        let settings = ModelSettings::default();
        let first = builder.build_at(&messages, &model, &settings, fixed_time());

        let again: Vec<Message> = first
            .body
            .messages
            .iter()
            .map(|m| Message::new(m.role, m.content.clone()))
            .collect();
        let second = builder.build_at(&again, &model, &settings, fixed_time());

        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_sampling_parameters_are_copied(
        temperature in 0.0f32..2.0,
        top_p in 0.0f32..1.0,
        presence in -2.0f32..2.0,
        frequency in -2.0f32..2.0,
    ) {
        let settings = ModelSettings {
            temperature,
            top_p,
            presence_penalty: presence,
            frequency_penalty: frequency,
            ..ModelSettings::default()
        };
        let builder = RequestBuilder::new(table(), SystemPromptMode::Replace);
        let request = builder.build_at(&[Message::user("hi")], "deepseek", &settings, fixed_time());

        prop_assert_eq!(request.body.temperature, temperature);
        prop_assert_eq!(request.body.top_p, top_p);
        prop_assert_eq!(request.body.presence_penalty, presence);
        prop_assert_eq!(request.body.frequency_penalty, frequency);
        prop_assert!(request.body.stream);
    }
}

#[test]
fn test_gpt_models_go_to_openai_endpoint() {
    let builder = RequestBuilder::new(table(), SystemPromptMode::Replace);
    let request = builder.build_at(
        &[Message::user("hello")],
        "gpt-4",
        &ModelSettings::default(),
        fixed_time(),
    );

    assert_eq!(request.url, "https://openai.test/v1/chat/completions");
    assert_eq!(request.api_key, "oa-key");
    assert_eq!(request.body.model, "gpt-4");
}

#[test]
fn test_unknown_model_falls_back_to_deepseek_chat() {
    let builder = RequestBuilder::new(table(), SystemPromptMode::Replace);
    let request = builder.build_at(
        &[Message::user("hello")],
        "mistral-large",
        &ModelSettings::default(),
        fixed_time(),
    );

    assert_eq!(request.url, "https://deepseek.test/chat/completions");
    assert_eq!(request.body.model, "deepseek-chat");
    assert!(request.body.messages[0]
        .content
        .starts_with("You are a helpful AI assistant."));
}

#[test]
fn test_prepend_if_absent_keeps_persona_prompt() {
    let builder = RequestBuilder::new(table(), SystemPromptMode::PrependIfAbsent);
    let messages = vec![
        Message::system("You are a pirate."),
        Message::user("Ahoy"),
    ];
    let request = builder.build_at(&messages, "deepseek", &ModelSettings::default(), fixed_time());

    assert_eq!(request.body.messages.len(), 2);
    assert_eq!(request.body.messages[0].content, "You are a pirate.");
}

#[test]
fn test_request_body_serializes_wire_names() {
    let builder = RequestBuilder::new(table(), SystemPromptMode::Replace);
    let request = builder.build_at(
        &[Message::user("hello")],
        "deepseek",
        &ModelSettings::default(),
        fixed_time(),
    );

    let json = serde_json::to_value(&request.body).unwrap();
    assert_eq!(json["model"], "deepseek-chat");
    assert_eq!(json["stream"], true);
    assert_eq!(json["messages"][0]["role"], "system");
    assert_eq!(json["messages"][1]["role"], "user");
    assert_eq!(json["messages"][1]["content"], "hello");
    assert!(json.get("presence_penalty").is_some());
    assert!(json.get("frequency_penalty").is_some());
}
