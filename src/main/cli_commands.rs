// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io::{self, Write};
use std::sync::Arc;

use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};

use chatwire::chat::{ChatOrchestrator, ChunkSink, SendOutcome};
use chatwire::cli::{AskArgs, HistoryArgs, HistoryCommands, SettingsArgs, SettingsCommands};
use chatwire::config::Settings;
use chatwire::error::{ApiError, ChatError, Result};
use chatwire::history::ConversationStore;
use chatwire::llm::message::{Message, Role};
use chatwire::llm::routing::{route, KNOWN_MODELS};
use chatwire::network::{HttpProbe, NetworkMonitor};

/// Answer a single prompt, streaming the reply to stdout
pub(super) async fn run_ask(args: AskArgs, settings: Settings) -> Result<()> {
    let model = args.model.unwrap_or_else(|| settings.model.model.clone());
    tracing::debug!("Ask mode with model {}", model);

    // One-shot sends are not queued for replay, so the replay channel is
    // dropped right away.
    let (monitor, _replay_rx) = NetworkMonitor::new(
        settings.network.clone(),
        Arc::new(HttpProbe::new(settings.network.probe_url.clone())),
        true,
    );
    let orchestrator = ChatOrchestrator::from_settings(&settings, monitor);

    let sink: Arc<dyn ChunkSink> = Arc::new(|chunk: &str| {
        let mut stdout = io::stdout();
        let _ = write!(stdout, "{}", chunk);
        let _ = stdout.flush();
    });

    let send = orchestrator.send_streaming_message(
        vec![Message::user(&args.prompt)],
        &model,
        &settings.model,
        sink,
    );
    tokio::pin!(send);

    let outcome = loop {
        tokio::select! {
            outcome = &mut send => break outcome?,
            _ = tokio::signal::ctrl_c() => orchestrator.stop_streaming(),
        }
    };

    // Keep ask-mode output behavior consistent: always terminate with a newline.
    println!();

    match outcome {
        SendOutcome::Completed | SendOutcome::Stopped => Ok(()),
        SendOutcome::Queued => Err(ApiError::NetworkUnavailable.into()),
    }
}

/// Run settings subcommands
pub(super) fn run_settings_command(args: SettingsArgs, mut settings: Settings) -> Result<()> {
    match args.command.unwrap_or(SettingsCommands::Show) {
        SettingsCommands::Show => {
            let json = serde_json::to_string_pretty(&settings)?;
            println!("{}", json);
        }
        SettingsCommands::Path => {
            println!("{}", Settings::default_path().display());
        }
        SettingsCommands::Set { key, value } => {
            settings.set_value(&key, &value)?;
            settings.save()?;
            println!("Setting '{}' updated.", key);
        }
        SettingsCommands::Reset => {
            Settings::reset()?;
            println!("Settings reset to defaults.");
        }
    }
    Ok(())
}

/// Print the known models with the provider and wire name they map to
pub(super) fn run_models_command(settings: &Settings) -> Result<()> {
    let mut stdout = io::stdout();

    println!("\nModels:\n");
    for model in KNOWN_MODELS {
        let route = route(model);
        let marker = if *model == settings.model.model { "*" } else { " " };
        let configured = settings.is_provider_configured(route.provider);

        print!(" {} {:<20} {:<10} {:<20}", marker, model, route.provider.name(), route.wire_model);
        if configured {
            println!();
        } else {
            stdout.execute(SetForegroundColor(Color::Yellow))?;
            println!(" (no API key, set {})", route.provider.default_api_key_env());
            stdout.execute(ResetColor)?;
        }
    }
    println!("\nOther names are sent to DeepSeek chat; gpt-* names go to OpenAI as given.\n");
    Ok(())
}

pub(super) fn run_history_command(args: HistoryArgs, settings: &Settings) -> Result<()> {
    let mut store =
        ConversationStore::open()?.with_auto_title(settings.conversation.auto_generate_title);

    match args.command {
        HistoryCommands::List { limit } => {
            let conversations = store.list();
            let current = store.current_id();

            println!("\nConversations:\n");
            for conversation in conversations.iter().take(limit) {
                let id_short = &conversation.id.to_string()[..8];
                let date = conversation.timestamp.format("%Y-%m-%d %H:%M");
                let marker = if conversation.id == current { "*" } else { " " };
                let last = if conversation.last_message.is_empty() {
                    "(empty)"
                } else {
                    conversation.last_message.as_str()
                };

                println!(
                    " {} {} | {} | {} | {}",
                    marker, id_short, date, conversation.title, last
                );
            }
            println!();
        }

        HistoryCommands::Show { id } => {
            let id = store.resolve_id(&id)?;
            let conversation = store
                .get(id)
                .ok_or_else(|| ChatError::History(format!("conversation {} not found", id)))?;

            println!("\nConversation: {}", conversation.id);
            println!("Title: {}", conversation.title);
            println!(
                "Updated: {}",
                conversation.timestamp.format("%Y-%m-%d %H:%M:%S")
            );
            println!("Messages: {}\n", conversation.messages.len());

            let mut stdout = io::stdout();
            for message in &conversation.messages {
                let color = match message.role {
                    Role::System => Color::DarkGrey,
                    Role::User => Color::Green,
                    Role::Assistant => Color::Cyan,
                };
                stdout.execute(SetForegroundColor(color))?;
                print!("{}", message.role.as_str());
                if let Some(model) = message.model.as_deref() {
                    print!(" ({})", model);
                }
                print!(": ");
                stdout.execute(ResetColor)?;
                println!("{}\n", message.content);
            }
        }

        HistoryCommands::Delete { id } => {
            let id = store.resolve_id(&id)?;
            if store.delete(id)? {
                println!("Conversation deleted.");
            } else {
                println!("Conversation not found.");
            }
        }

        HistoryCommands::New => {
            let id = store.create_new()?;
            println!("Started conversation {}.", &id.to_string()[..8]);
        }

        HistoryCommands::Mask {
            name,
            description,
            prompt,
        } => {
            let id = store.create_masked(&name, &description, &prompt)?;
            println!("Started conversation {} with {}.", &id.to_string()[..8], name);
        }
    }

    Ok(())
}
