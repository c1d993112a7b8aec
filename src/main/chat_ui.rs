// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};

use chatwire::chat::ChunkSink;
use chatwire::error::Result;
use chatwire::history::Conversation;
use chatwire::llm::message::Role;

/// Prints streamed text as it arrives and keeps a copy for the history
#[derive(Debug, Default)]
pub(super) struct TerminalSink {
    text: Mutex<String>,
}

impl TerminalSink {
    pub(super) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        match self.text.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Terminal sink lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Text of the current attempt
    pub(super) fn text(&self) -> String {
        self.lock().clone()
    }

    pub(super) fn clear(&self) {
        self.lock().clear();
    }
}

impl ChunkSink for TerminalSink {
    fn on_chunk(&self, chunk: &str) {
        self.lock().push_str(chunk);
        let mut stdout = io::stdout();
        let _ = write!(stdout, "{}", chunk);
        let _ = stdout.flush();
    }

    fn on_restart(&self) {
        self.lock().clear();
        let _ = print_notice(Color::Yellow, "\n(connection interrupted, restarting reply)");
    }

    fn supports_restart(&self) -> bool {
        true
    }
}

/// Print the greeting with the active model and conversation
pub(super) fn print_welcome(model: &str, conversation: Option<&Conversation>) -> Result<()> {
    let mut stdout = io::stdout();

    println!();
    stdout.execute(SetForegroundColor(Color::Cyan))?;
    print!("chatwire");
    stdout.execute(ResetColor)?;
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!("Model: {}", model);

    if let Some(conversation) = conversation {
        println!(
            "Conversation: {} ({}, {} messages)",
            conversation.title,
            &conversation.id.to_string()[..8],
            conversation.messages.len()
        );
        if let Some(last) = conversation.messages.last() {
            if last.role == Role::Assistant {
                println!("  {}", conversation.last_message);
            }
        }
    }

    println!("Type /help for commands, Ctrl+C stops a reply.\n");
    Ok(())
}

pub(super) fn print_help() -> Result<()> {
    println!();
    println!("  /new      start a new conversation");
    println!("  /history  show the last messages of this conversation");
    println!("  /status   show connectivity and queued sends");
    println!("  /stop     stop replies that are still streaming");
    println!("  /quit     leave chatwire");
    println!();
    Ok(())
}

/// Read user input
pub(super) fn read_user_input() -> Result<String> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Green))?;
    print!("you: ");
    stdout.execute(ResetColor)?;
    stdout.flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Print the colored name of the answering model
pub(super) fn print_response_prefix(model: &str) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Cyan))?;
    print!("\n{}: ", model);
    stdout.execute(ResetColor)?;
    stdout.flush()?;
    Ok(())
}

pub(super) fn print_notice(color: Color, message: &str) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(color))?;
    println!("{}", message);
    stdout.execute(ResetColor)?;
    stdout.flush()?;
    Ok(())
}

/// Print the last `count` messages of a conversation, system prompts excluded
pub(super) fn print_conversation_tail(conversation: &Conversation, count: usize) -> Result<()> {
    let visible: Vec<_> = conversation
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .collect();
    let start = visible.len().saturating_sub(count);

    println!();
    for message in &visible[start..] {
        let color = match message.role {
            Role::User => Color::Green,
            _ => Color::Cyan,
        };
        let mut stdout = io::stdout();
        stdout.execute(SetForegroundColor(color))?;
        print!("{}: ", message.model.as_deref().unwrap_or(message.role.as_str()));
        stdout.execute(ResetColor)?;
        println!("{}", message.content);
    }
    println!();
    Ok(())
}
