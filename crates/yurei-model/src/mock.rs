// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::message::{ContentPart, Message, Role, StreamedMessagePart, ToolCall};
use crate::provider::{ChatError, ChatProvider, EventStream, StreamEvent, TokenUsage, ToolSchema};

/// A recorded `generate` call, for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system_prompt: String,
    pub tool_names: Vec<String>,
    pub history: Vec<Message>,
}

/// A pre-scripted provider.  Each `generate` call pops the next script from
/// the front of the queue; tests specify exact event sequences, including
/// tool calls and transport errors, without network access.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Vec<Result<StreamEvent, ChatError>>>>,
    /// Every request seen, in call order.
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Vec<Result<StreamEvent, ChatError>>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Provider that answers every call with a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::new(vec![Self::text_script(reply)])
    }

    /// Script: one text part plus usage.
    pub fn text_script(text: impl Into<String>) -> Vec<Result<StreamEvent, ChatError>> {
        vec![
            Ok(StreamEvent::Part(StreamedMessagePart::Content(
                ContentPart::text(text),
            ))),
            Ok(StreamEvent::Usage(TokenUsage {
                input_other: 10,
                output: 5,
                ..Default::default()
            })),
        ]
    }

    /// Script: a text preamble followed by one complete tool call.
    pub fn tool_call_script(
        preamble: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
        args_json: impl Into<String>,
    ) -> Vec<Result<StreamEvent, ChatError>> {
        vec![
            Ok(StreamEvent::Part(StreamedMessagePart::Content(
                ContentPart::text(preamble),
            ))),
            Ok(StreamEvent::Part(StreamedMessagePart::ToolCall(
                ToolCall::new(id, name, args_json),
            ))),
            Ok(StreamEvent::Usage(TokenUsage {
                input_other: 20,
                output: 10,
                ..Default::default()
            })),
        ]
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "scripted-mock"
    }

    async fn generate(
        &self,
        system_prompt: &str,
        tools: &[ToolSchema],
        history: &[Message],
    ) -> Result<EventStream, ChatError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            system_prompt: system_prompt.to_string(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            history: history.to_vec(),
        });
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ChatError::Other("scripted provider exhausted".into()))?;
        Ok(Box::pin(stream::iter(script)))
    }
}

/// Echoes the last user message back as the assistant response.  Useful
/// for offline smoke runs (`provider.type = "mock"`).
#[derive(Default)]
pub struct EchoProvider;

#[async_trait]
impl ChatProvider for EchoProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "echo"
    }

    async fn generate(
        &self,
        _system_prompt: &str,
        _tools: &[ToolSchema],
        history: &[Message],
    ) -> Result<EventStream, ChatError> {
        let reply = history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.extract_text(""))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "[no input]".into());
        let events: Vec<Result<StreamEvent, ChatError>> = vec![
            Ok(StreamEvent::Id("echo".into())),
            Ok(StreamEvent::Part(StreamedMessagePart::Content(
                ContentPart::text(reply),
            ))),
            Ok(StreamEvent::Usage(TokenUsage {
                input_other: 1,
                output: 1,
                ..Default::default()
            })),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
