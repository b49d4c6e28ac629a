// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::{Message, StreamedMessagePart};

/// A tool definition handed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: serde_json::Value,
}

/// Token accounting for one generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens not served from cache.
    pub input_other: u64,
    pub output: u64,
    pub input_cache_read: u64,
    pub input_cache_creation: u64,
}

impl TokenUsage {
    /// Total footprint of the exchange; used as the running context size.
    pub fn total(&self) -> u64 {
        self.input_other + self.output + self.input_cache_read + self.input_cache_creation
    }
}

/// Closed transport error taxonomy.  Everything a provider can fail with
/// maps onto one of these; the step-loop's retry policy keys off
/// [`ChatError::is_retryable`].
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    #[error("API connection error: {0}")]
    Connection(String),
    #[error("API request timed out: {0}")]
    Timeout(String),
    #[error("API status error {status}: {message}")]
    Status { status: u16, message: String },
    #[error("the API returned an empty response")]
    EmptyResponse,
    #[error("chat provider error: {0}")]
    Other(String),
}

impl ChatError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::Connection(_) | ChatError::Timeout(_) | ChatError::EmptyResponse => true,
            ChatError::Status { status, .. } => *status >= 500 || *status == 429,
            ChatError::Other(_) => false,
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            ChatError::Connection(err.to_string())
        } else {
            ChatError::Other(err.to_string())
        }
    }
}

/// One event of a generation stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Provider message id; at most one per stream.
    Id(String),
    /// A message part in temporal order.  A `ToolCall` always precedes its
    /// `ToolCallPart` fragments.
    Part(StreamedMessagePart),
    /// Final usage statistics; at most one per stream.
    Usage(TokenUsage),
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ChatError>> + Send>>;

/// A streaming LLM transport adapter.  Adapters are interchangeable:
/// swapping one must not change step-loop behavior so long as the declared
/// capabilities match.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Stable adapter id for status display.
    fn name(&self) -> &'static str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Start one generation and return the event stream.
    async fn generate(
        &self,
        system_prompt: &str,
        tools: &[ToolSchema],
        history: &[Message],
    ) -> Result<EventStream, ChatError>;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
