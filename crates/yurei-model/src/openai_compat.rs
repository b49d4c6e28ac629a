// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Shared base for providers speaking the `/chat/completions` SSE protocol.
//!
//! The Kimi and legacy-OpenAI adapters differ only in endpoint defaults,
//! headers and the field their thinking deltas arrive in, so both wrap this
//! single implementation.

use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::message::{
    ContentPart, Message, Role, StreamedMessagePart, ToolCall, ToolCallPart,
};
use crate::provider::{ChatError, EventStream, StreamEvent, TokenUsage, ToolSchema};

/// OpenAI-compatible chat completions provider.
pub struct ChatCompletionsProvider {
    driver_name: &'static str,
    model: String,
    api_key: String,
    chat_url: String,
    client: reqwest::Client,
    extra_headers: Vec<(String, String)>,
    /// Delta field carrying chain-of-thought text.
    reasoning_field: String,
    /// Extra key-value pairs merged verbatim into the request body
    /// (e.g. `prompt_cache_key`).
    generation_kwargs: serde_json::Map<String, Value>,
}

impl ChatCompletionsProvider {
    pub fn new(
        driver_name: &'static str,
        model: String,
        base_url: &str,
        api_key: String,
        extra_headers: Vec<(String, String)>,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            driver_name,
            model,
            api_key,
            chat_url: format!("{base}/chat/completions"),
            client: reqwest::Client::new(),
            extra_headers,
            reasoning_field: "reasoning_content".into(),
            generation_kwargs: serde_json::Map::new(),
        }
    }

    pub fn with_reasoning_field(mut self, field: impl Into<String>) -> Self {
        self.reasoning_field = field.into();
        self
    }

    pub fn with_generation_kwarg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.generation_kwargs.insert(key.into(), value);
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub async fn generate(
        &self,
        system_prompt: &str,
        tools: &[ToolSchema],
        history: &[Message],
    ) -> Result<EventStream, ChatError> {
        let messages = build_chat_messages(system_prompt, history);
        let tools_json: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        if !tools_json.is_empty() {
            body["tools"] = json!(tools_json);
        }
        for (k, v) in &self.generation_kwargs {
            body[k] = v.clone();
        }

        debug!(
            driver = %self.driver_name,
            model = %self.model,
            tool_count = tools.len(),
            message_count = messages.len(),
            "sending chat completions request"
        );

        let mut req = self
            .client
            .post(&self.chat_url)
            .bearer_auth(&self.api_key)
            .json(&body);
        for (name, val) in &self.extra_headers {
            req = req.header(name.as_str(), val.as_str());
        }

        let resp = req.send().await.map_err(ChatError::from_reqwest)?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ChatError::Status { status, message });
        }

        let reasoning_field = self.reasoning_field.clone();
        let byte_stream = resp.bytes_stream();
        // SSE events can split across TCP chunks; keep a line buffer and
        // emit events only for complete lines.
        let event_stream = byte_stream
            .scan(SseState::new(reasoning_field), |state, chunk| {
                let events = match chunk {
                    Ok(bytes) => {
                        state.buf.push_str(&String::from_utf8_lossy(&bytes));
                        state.drain()
                    }
                    Err(e) => vec![Err(ChatError::from_reqwest(e))],
                };
                std::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }
}

/// Line-buffer state threaded through the SSE scan.
pub(crate) struct SseState {
    pub(crate) buf: String,
    id_seen: bool,
    reasoning_field: String,
}

impl SseState {
    pub(crate) fn new(reasoning_field: String) -> Self {
        Self {
            buf: String::new(),
            id_seen: false,
            reasoning_field,
        }
    }

    /// Drain all complete `\n`-terminated lines; a trailing partial line
    /// stays in the buffer for the next chunk.
    pub(crate) fn drain(&mut self) -> Vec<Result<StreamEvent, ChatError>> {
        let mut events = Vec::new();
        while let Some(nl) = self.buf.find('\n') {
            let line = self.buf[..nl].trim_end_matches('\r').to_string();
            self.buf = self.buf[nl + 1..].to_string();
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() || data == "[DONE]" {
                continue;
            }
            let Ok(v) = serde_json::from_str::<Value>(data) else {
                continue;
            };
            self.parse_chunk(&v, &mut events);
        }
        events
    }

    fn parse_chunk(&mut self, v: &Value, out: &mut Vec<Result<StreamEvent, ChatError>>) {
        if !self.id_seen {
            if let Some(id) = v["id"].as_str().filter(|s| !s.is_empty()) {
                self.id_seen = true;
                out.push(Ok(StreamEvent::Id(id.to_string())));
            }
        }

        // usage-only chunk (stream_options.include_usage)
        if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
            out.push(Ok(StreamEvent::Usage(parse_usage(usage))));
            return;
        }

        let delta = &v["choices"][0]["delta"];

        if let Some(tool_calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
            for tc in tool_calls {
                let id = tc["id"].as_str().unwrap_or("");
                let name = tc["function"]["name"].as_str().unwrap_or("");
                let args = tc["function"]["arguments"].as_str().unwrap_or("");
                if !id.is_empty() {
                    // a fresh call announcement; arguments may already start
                    out.push(Ok(StreamEvent::Part(StreamedMessagePart::ToolCall(
                        ToolCall::new(id, name, args),
                    ))));
                } else if !args.is_empty() {
                    out.push(Ok(StreamEvent::Part(StreamedMessagePart::ToolCallPart(
                        ToolCallPart {
                            arguments_part: args.to_string(),
                        },
                    ))));
                }
            }
            return;
        }

        if let Some(think) = delta
            .get(&self.reasoning_field)
            .and_then(|c| c.as_str())
            .filter(|s| !s.is_empty())
        {
            out.push(Ok(StreamEvent::Part(StreamedMessagePart::Content(
                ContentPart::think(think),
            ))));
            return;
        }

        if let Some(text) = delta
            .get("content")
            .and_then(|c| c.as_str())
            .filter(|s| !s.is_empty())
        {
            out.push(Ok(StreamEvent::Part(StreamedMessagePart::Content(
                ContentPart::text(text),
            ))));
        }
    }
}

fn parse_usage(usage: &Value) -> TokenUsage {
    let prompt = usage["prompt_tokens"].as_u64().unwrap_or(0);
    let cached = usage
        .get("prompt_tokens_details")
        .and_then(|d| d.get("cached_tokens"))
        .and_then(|t| t.as_u64())
        .or_else(|| usage.get("prompt_cache_hit_tokens").and_then(|t| t.as_u64()))
        .unwrap_or(0);
    TokenUsage {
        input_other: prompt.saturating_sub(cached),
        output: usage["completion_tokens"].as_u64().unwrap_or(0),
        input_cache_read: cached,
        input_cache_creation: 0,
    }
}

fn role_str(r: Role) -> &'static str {
    match r {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Serialize the system prompt plus history into the chat-completions wire
/// array.  Think parts are not replayed; tool-role content is always a
/// plain string (these messages are flattened upstream).  System-role
/// messages in history are skipped: the prompt travels as its own
/// parameter and must reach the API exactly once.
pub(crate) fn build_chat_messages(system_prompt: &str, history: &[Message]) -> Vec<Value> {
    let mut out = Vec::with_capacity(history.len() + 1);
    if !system_prompt.is_empty() {
        out.push(json!({ "role": "system", "content": system_prompt }));
    }
    for m in history {
        if m.role == Role::System {
            continue;
        }
        let mut obj = json!({ "role": role_str(m.role) });

        let parts: Vec<&ContentPart> = m
            .content
            .iter()
            .filter(|p| !matches!(p, ContentPart::Think { .. }))
            .collect();
        let all_text = parts.iter().all(|p| matches!(p, ContentPart::Text { .. }));
        if m.role == Role::Tool || all_text {
            obj["content"] = json!(m.extract_text(""));
        } else {
            let blocks: Vec<Value> = parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                    ContentPart::ImageUrl { image_url } => json!({
                        "type": "image_url",
                        "image_url": { "url": image_url.url },
                    }),
                    ContentPart::AudioUrl { audio_url } => json!({
                        "type": "audio_url",
                        "audio_url": { "url": audio_url.url },
                    }),
                    ContentPart::Think { .. } => unreachable!("think parts filtered above"),
                })
                .collect();
            obj["content"] = json!(blocks);
        }

        if let Some(calls) = &m.tool_calls {
            let calls: Vec<Value> = calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.function.name,
                            "arguments": tc.function.arguments,
                        }
                    })
                })
                .collect();
            obj["tool_calls"] = json!(calls);
        }
        if let Some(id) = &m.tool_call_id {
            obj["tool_call_id"] = json!(id);
        }
        if let Some(name) = &m.name {
            obj["name"] = json!(name);
        }
        out.push(obj);
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
