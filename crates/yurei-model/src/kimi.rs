// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Kimi driver — thin wrapper around the shared [`ChatCompletionsProvider`].

use async_trait::async_trait;
use serde_json::json;

use crate::message::Message;
use crate::openai_compat::ChatCompletionsProvider;
use crate::provider::{ChatError, ChatProvider, EventStream, ToolSchema};

pub const DEFAULT_KIMI_BASE_URL: &str = "https://api.moonshot.ai/v1";

pub struct Kimi {
    inner: ChatCompletionsProvider,
}

impl Kimi {
    pub fn new(
        model: String,
        base_url: Option<&str>,
        api_key: String,
        extra_headers: Vec<(String, String)>,
    ) -> Self {
        Self {
            inner: ChatCompletionsProvider::new(
                "kimi",
                model,
                base_url.unwrap_or(DEFAULT_KIMI_BASE_URL),
                api_key,
                extra_headers,
            ),
        }
    }

    /// Pin all requests of one session to the same provider-side prompt
    /// cache entry.
    pub fn with_prompt_cache_key(mut self, key: impl Into<String>) -> Self {
        self.inner = self
            .inner
            .with_generation_kwarg("prompt_cache_key", json!(key.into()));
        self
    }
}

#[async_trait]
impl ChatProvider for Kimi {
    fn name(&self) -> &'static str {
        "kimi"
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn generate(
        &self,
        system_prompt: &str,
        tools: &[ToolSchema],
        history: &[Message],
    ) -> Result<EventStream, ChatError> {
        self.inner.generate(system_prompt, tools, history).await
    }
}
