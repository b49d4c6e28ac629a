// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Legacy OpenAI chat-completions driver.
//!
//! `reasoning_key` selects the delta field carrying chain-of-thought for
//! OpenAI-compatible backends that expose one (DeepSeek and friends).

use async_trait::async_trait;

use crate::message::Message;
use crate::openai_compat::ChatCompletionsProvider;
use crate::provider::{ChatError, ChatProvider, EventStream, ToolSchema};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAILegacy {
    inner: ChatCompletionsProvider,
}

impl OpenAILegacy {
    pub fn new(
        model: String,
        base_url: Option<&str>,
        api_key: String,
        reasoning_key: Option<String>,
    ) -> Self {
        let mut inner = ChatCompletionsProvider::new(
            "openai_legacy",
            model,
            base_url.unwrap_or(DEFAULT_OPENAI_BASE_URL),
            api_key,
            vec![],
        );
        if let Some(key) = reasoning_key {
            inner = inner.with_reasoning_field(key);
        }
        Self { inner }
    }
}

#[async_trait]
impl ChatProvider for OpenAILegacy {
    fn name(&self) -> &'static str {
        "openai_legacy"
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
