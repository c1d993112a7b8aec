// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM module for chatwire
//!
//! Request building, model routing, the streaming transport and retries.

pub mod message;
pub mod mock_transport;
pub mod request;
pub mod retry;
pub mod routing;
pub mod sse;
pub mod transport;

pub use message::*;
pub use request::{ChatRequest, PreparedRequest, RequestBuilder, WireMessage};
pub use retry::{is_retryable, with_retry, RetryPolicy};
pub use routing::{route, ModelFamily, ProviderEndpoint, ProviderKind, ProviderTable, Route};
pub use transport::{ChatTransport, HttpTransport};
