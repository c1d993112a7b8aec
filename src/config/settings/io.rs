// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::{Path, PathBuf};

use crate::error::{ChatError, Result};

use super::Settings;

impl Settings {
    /// Get the default settings file path.
    pub fn default_path() -> PathBuf {
        Self::chatwire_home().join("settings.json")
    }

    /// Load settings from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from a specific path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content).map_err(|e| {
            ChatError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overwrite the settings file at `path` with defaults.
    pub fn reset_at(path: &Path) -> Result<Self> {
        let settings = Self::default();
        settings.save_to(path)?;
        Ok(settings)
    }

    /// Reset the default settings file.
    pub fn reset() -> Result<Self> {
        Self::reset_at(&Self::default_path())
    }

    /// Get the chatwire home directory (~/.chatwire or $CHATWIRE_HOME).
    pub fn chatwire_home() -> PathBuf {
        if let Ok(home) = std::env::var("CHATWIRE_HOME") {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chatwire")
    }

    /// Get the conversation history file.
    pub fn conversations_path() -> PathBuf {
        Self::chatwire_home().join("conversations.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories() -> Result<()> {
        let home = Self::chatwire_home();
        if !home.exists() {
            std::fs::create_dir_all(&home)?;
        }
        Ok(())
    }
}
