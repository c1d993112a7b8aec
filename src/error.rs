// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for chatwire
//!
//! This module defines all error types used throughout the crate.

use std::time::Duration;

use thiserror::Error;

use crate::network::AbortReason;

/// Main error type for chatwire operations
#[derive(Error, Debug)]
pub enum ChatError {
    /// API and transport errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Conversation history errors
    #[error("History error: {0}")]
    History(String),
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// The provider answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The response carried no readable body
    #[error("No response body")]
    NoBody,

    /// A single stream event could not be parsed
    #[error("Failed to parse stream event: {0}")]
    Parse(String),

    /// Connectivity is down, the send should wait for reconnection
    #[error("Network unavailable")]
    NetworkUnavailable,

    /// The stream was aborted
    #[error("Request aborted ({0})")]
    Aborted(AbortReason),

    /// A single read stalled past its deadline while offline
    #[error("Read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// Generic network failure (connect, reset, body read)
    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Api(err.into())
    }
}

impl ChatError {
    /// The inner API error, if any
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            ChatError::Api(api) => Some(api),
            _ => None,
        }
    }

    /// Cancellation-class errors are never retried
    pub fn is_cancellation(&self) -> bool {
        matches!(self.api(), Some(ApiError::Aborted(_)))
    }

    /// Explicit stop requested by the user
    pub fn is_user_abort(&self) -> bool {
        matches!(self.api(), Some(ApiError::Aborted(AbortReason::User)))
    }

    /// Failures caused by losing connectivity; these are queued for replay
    /// instead of being reported.
    pub fn is_connectivity_loss(&self) -> bool {
        matches!(
            self.api(),
            Some(
                ApiError::NetworkUnavailable
                    | ApiError::Aborted(AbortReason::Disconnect)
                    | ApiError::ReadTimeout(_)
            )
        )
    }

    /// HTTP status code, when the provider returned one
    pub fn status(&self) -> Option<u16> {
        match self.api() {
            Some(ApiError::Http { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for chatwire operations
pub type Result<T> = std::result::Result<T, ChatError>;
