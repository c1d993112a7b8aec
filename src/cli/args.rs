// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap
//!
//! Defines all command-line arguments and subcommands for chatwire.

use clap::{Parser, Subcommand};

/// chatwire - streaming LLM chat client for your terminal
#[derive(Parser, Debug)]
#[command(name = "chatwire")]
#[command(version, about = "Streaming LLM chat client for your terminal")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start interactive chat session (default when no command given)
    Chat(ChatArgs),

    /// Ask a single question (non-interactive)
    Ask(AskArgs),

    /// Conversation history management
    History(HistoryArgs),

    /// Show or change configuration
    #[command(alias = "config")]
    Settings(SettingsArgs),

    /// List known models and where they are routed
    Models,
}

/// Arguments for the chat subcommand
#[derive(clap::Args, Debug, Default)]
pub struct ChatArgs {
    /// Model to use (defaults to the configured model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Continue a stored conversation (ID or ID prefix)
    #[arg(short, long)]
    pub conversation: Option<String>,
}

/// Arguments for the ask subcommand
#[derive(clap::Args, Debug)]
pub struct AskArgs {
    /// The question to ask
    pub prompt: String,

    /// Model to use
    #[arg(short, long)]
    pub model: Option<String>,
}

/// Arguments for history management
#[derive(clap::Args, Debug)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub command: HistoryCommands,
}

/// History subcommands
#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    /// List conversations
    List {
        /// Maximum number of conversations to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show a conversation
    Show {
        /// Conversation ID or ID prefix
        id: String,
    },

    /// Delete a conversation
    Delete {
        /// Conversation ID or ID prefix
        id: String,
    },

    /// Start a new empty conversation
    New,

    /// Start a conversation with a persona prompt
    Mask {
        /// Persona name, also used as the title
        name: String,

        /// Short description used in the greeting
        description: String,

        /// System prompt for the persona
        prompt: String,
    },
}

/// Arguments for settings/config
#[derive(clap::Args, Debug)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: Option<SettingsCommands>,
}

/// Settings subcommands
#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Show current configuration
    Show,

    /// Print the settings file location
    Path,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "model.temperature", "network.read_timeout_ms")
        key: String,

        /// Value to set
        value: String,
    },

    /// Reset configuration to defaults
    Reset,
}
