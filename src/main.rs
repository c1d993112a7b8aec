// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! chatwire - streaming LLM chat client for your terminal
//!
//! Entry point for the chatwire CLI application.

use std::io::{self, Write};
use std::sync::Arc;

use clap::Parser;
use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};

use chatwire::chat::{ChatOrchestrator, ChunkSink, SendOutcome};
use chatwire::cli::{ChatArgs, Cli, Commands};
use chatwire::config::Settings;
use chatwire::error::Result;
use chatwire::history::ConversationStore;
use chatwire::llm::message::Message;
use chatwire::network::{HttpProbe, NetworkMonitor};

#[path = "main/chat_ui.rs"]
mod chat_ui;
#[path = "main/cli_commands.rs"]
mod cli_commands;

use chat_ui::{
    print_conversation_tail, print_help, print_notice, print_response_prefix, print_welcome,
    read_user_input, TerminalSink,
};
use cli_commands::{run_ask, run_history_command, run_models_command, run_settings_command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` surfaces retry, connectivity and replay decisions. `RUST_LOG`
    // still takes precedence for anything more specific.
    if cli.verbose > 0 {
        let directive = if cli.verbose > 1 {
            "chatwire=trace"
        } else {
            "chatwire=debug"
        };
        if let Ok(parsed) = directive.parse() {
            env_filter = env_filter.add_directive(parsed);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    // Load settings
    let settings = Settings::load()?;

    // Ensure directories exist
    Settings::ensure_directories()?;

    // Dispatch to appropriate command
    match cli.command {
        None => run_chat(ChatArgs::default(), settings).await?,
        Some(Commands::Chat(args)) => run_chat(args, settings).await?,
        Some(Commands::Ask(args)) => run_ask(args, settings).await?,
        Some(Commands::History(args)) => run_history_command(args, &settings)?,
        Some(Commands::Settings(args)) => run_settings_command(args, settings)?,
        Some(Commands::Models) => run_models_command(&settings)?,
    }

    Ok(())
}

/// Assistant replies from queued sends that were still in flight when the
/// prompt came back
struct PendingReply {
    conversation_id: uuid::Uuid,
    model: String,
    sink: Arc<TerminalSink>,
}

/// Run the interactive chat loop
async fn run_chat(args: ChatArgs, settings: Settings) -> Result<()> {
    let model = args.model.unwrap_or_else(|| settings.model.model.clone());

    let mut store =
        ConversationStore::open()?.with_auto_title(settings.conversation.auto_generate_title);
    if let Some(query) = args.conversation.as_deref() {
        let id = store.resolve_id(query)?;
        store.set_current(id)?;
    }

    let (monitor, replay_rx) = NetworkMonitor::new(
        settings.network.clone(),
        Arc::new(HttpProbe::new(settings.network.probe_url.clone())),
        true,
    );
    if !monitor.probe_now().await {
        tracing::info!("Starting offline, sends will be queued");
    }
    monitor.start_polling();

    let orchestrator = Arc::new(ChatOrchestrator::from_settings(&settings, monitor.clone()));
    let replay_worker = orchestrator.spawn_replay_worker(replay_rx);

    print_welcome(&model, store.current())?;

    let mut pending: Vec<PendingReply> = Vec::new();

    loop {
        persist_finished_replies(&mut store, &orchestrator, &mut pending)?;

        let input = read_user_input()?;
        if input.is_empty() {
            continue;
        }

        match input.as_str() {
            "/quit" | "/exit" => break,
            "/help" => {
                print_help()?;
                continue;
            }
            "/new" => {
                store.create_new()?;
                print_notice(Color::Yellow, "Started a new conversation.")?;
                continue;
            }
            "/stop" => {
                orchestrator.stop_streaming();
                continue;
            }
            "/status" => {
                let state = monitor.state();
                println!(
                    "online: {}  queued: {}  active streams: {}",
                    state.is_online,
                    monitor.pending_len(),
                    monitor.active_sessions()
                );
                continue;
            }
            "/history" => {
                if let Some(conversation) = store.current() {
                    print_conversation_tail(conversation, 10)?;
                }
                continue;
            }
            _ => {}
        }

        let conversation_id = store.current_id();
        store.add_message(conversation_id, Message::user(&input))?;
        let messages = store
            .get(conversation_id)
            .map(|c| c.messages.clone())
            .unwrap_or_default();

        print_response_prefix(&model)?;
        let sink = Arc::new(TerminalSink::new());
        let send = orchestrator.send_streaming_message(
            messages,
            &model,
            &settings.model,
            sink.clone() as Arc<dyn ChunkSink>,
        );
        tokio::pin!(send);

        // Ctrl+C stops the stream; the send itself then resolves as stopped
        let result = loop {
            tokio::select! {
                result = &mut send => break result,
                _ = tokio::signal::ctrl_c() => orchestrator.stop_streaming(),
            }
        };
        println!();

        match result {
            Ok(SendOutcome::Completed) => {
                let reply = sink.text();
                if !reply.is_empty() {
                    store.add_message(
                        conversation_id,
                        Message::assistant(reply).with_model(model.as_str()),
                    )?;
                }
            }
            Ok(SendOutcome::Stopped) => {
                let partial = sink.text();
                if !partial.is_empty() {
                    store.add_message(
                        conversation_id,
                        Message::assistant(partial).with_model(model.as_str()),
                    )?;
                }
                print_notice(Color::Yellow, "Stopped.")?;
            }
            Ok(SendOutcome::Queued) => {
                // The replay starts the reply over
                sink.clear();
                print_notice(
                    Color::Yellow,
                    "Offline: the message is queued and will be sent when the connection returns.",
                )?;
                pending.push(PendingReply {
                    conversation_id,
                    model: model.clone(),
                    sink,
                });
            }
            Err(e) => {
                let mut stderr = io::stderr();
                stderr.execute(SetForegroundColor(Color::Red))?;
                eprintln!("Error: {}", e);
                stderr.execute(ResetColor)?;
                stderr.flush()?;
            }
        }
    }

    orchestrator.stop_streaming();
    monitor.shutdown();
    replay_worker.abort();
    Ok(())
}

/// Store replies of replayed sends once nothing is streaming anymore. Replies
/// that have not produced text yet stay pending.
fn persist_finished_replies(
    store: &mut ConversationStore,
    orchestrator: &ChatOrchestrator,
    pending: &mut Vec<PendingReply>,
) -> Result<()> {
    if pending.is_empty() || orchestrator.is_loading() || orchestrator.monitor().pending_len() > 0
    {
        return Ok(());
    }

    let mut waiting = Vec::new();
    for reply in pending.drain(..) {
        let text = reply.sink.text();
        if text.is_empty() {
            waiting.push(reply);
            continue;
        }
        store.add_message(
            reply.conversation_id,
            Message::assistant(text).with_model(reply.model.as_str()),
        )?;
    }
    *pending = waiting;
    Ok(())
}
