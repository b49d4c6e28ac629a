// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Anthropic messages API driver.

use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use async_trait::async_trait;

use crate::message::{ContentPart, Message, Role, StreamedMessagePart, ToolCall, ToolCallPart};
use crate::provider::{ChatError, ChatProvider, EventStream, StreamEvent, TokenUsage, ToolSchema};

pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 50_000;

pub struct Anthropic {
    model: String,
    api_key: String,
    base_url: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl Anthropic {
    pub fn new(model: String, base_url: Option<&str>, api_key: String) -> Self {
        Self {
            model,
            api_key,
            base_url: base_url
                .unwrap_or(DEFAULT_ANTHROPIC_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatProvider for Anthropic {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        system_prompt: &str,
        tools: &[ToolSchema],
        history: &[Message],
    ) -> Result<EventStream, ChatError> {
        let messages = build_anthropic_messages(history);
        let tools_json: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "stream": true,
        });
        if !system_prompt.is_empty() {
            body["system"] = json!(system_prompt);
        }
        if !tools_json.is_empty() {
            body["tools"] = json!(tools_json);
        }

        debug!(model = %self.model, message_count = messages.len(), "sending anthropic request");

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(ChatError::from_reqwest)?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ChatError::Status { status, message });
        }

        let byte_stream = resp.bytes_stream();
        let event_stream = byte_stream
            .scan(AnthropicSseState::default(), |state, chunk| {
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

#[derive(Default)]
struct AnthropicSseState {
    buf: String,
    /// Input token buckets stashed from `message_start`; combined with the
    /// output count that only arrives in `message_delta`.
    input_other: u64,
    input_cache_read: u64,
    input_cache_creation: u64,
}

impl AnthropicSseState {
    fn drain(&mut self) -> Vec<Result<StreamEvent, ChatError>> {
        let mut events = Vec::new();
        while let Some(nl) = self.buf.find('\n') {
            let line = self.buf[..nl].trim_end_matches('\r').to_string();
            self.buf = self.buf[nl + 1..].to_string();
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            let Ok(v) = serde_json::from_str::<Value>(data.trim()) else {
                continue;
            };
            self.parse_event(&v, &mut events);
        }
        events
    }

    fn parse_event(&mut self, v: &Value, out: &mut Vec<Result<StreamEvent, ChatError>>) {
        match v["type"].as_str().unwrap_or("") {
            "message_start" => {
                let message = &v["message"];
                if let Some(id) = message["id"].as_str() {
                    out.push(Ok(StreamEvent::Id(id.to_string())));
                }
                let usage = &message["usage"];
                self.input_other = usage["input_tokens"].as_u64().unwrap_or(0);
                self.input_cache_read = usage["cache_read_input_tokens"].as_u64().unwrap_or(0);
                self.input_cache_creation =
                    usage["cache_creation_input_tokens"].as_u64().unwrap_or(0);
            }
            "content_block_start" => {
                let block = &v["content_block"];
                if block["type"].as_str() == Some("tool_use") {
                    out.push(Ok(StreamEvent::Part(StreamedMessagePart::ToolCall(
                        ToolCall::new(
                            block["id"].as_str().unwrap_or(""),
                            block["name"].as_str().unwrap_or(""),
                            "",
                        ),
                    ))));
                }
            }
            "content_block_delta" => {
                let delta = &v["delta"];
                match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => {
                        if let Some(t) = delta["text"].as_str() {
                            out.push(Ok(StreamEvent::Part(StreamedMessagePart::Content(
                                ContentPart::text(t),
                            ))));
                        }
                    }
                    "thinking_delta" => {
                        if let Some(t) = delta["thinking"].as_str() {
                            out.push(Ok(StreamEvent::Part(StreamedMessagePart::Content(
                                ContentPart::think(t),
                            ))));
                        }
                    }
                    "signature_delta" => {
                        if let Some(sig) = delta["signature"].as_str() {
                            out.push(Ok(StreamEvent::Part(StreamedMessagePart::Content(
                                ContentPart::Think {
                                    think: String::new(),
                                    encrypted: Some(sig.to_string()),
                                },
                            ))));
                        }
                    }
                    "input_json_delta" => {
                        if let Some(j) = delta["partial_json"].as_str() {
                            out.push(Ok(StreamEvent::Part(StreamedMessagePart::ToolCallPart(
                                ToolCallPart {
                                    arguments_part: j.to_string(),
                                },
                            ))));
                        }
                    }
                    _ => {}
                }
            }
            "message_delta" => {
                let output = v["usage"]["output_tokens"].as_u64().unwrap_or(0);
                out.push(Ok(StreamEvent::Usage(TokenUsage {
                    input_other: self.input_other,
                    output,
                    input_cache_read: self.input_cache_read,
                    input_cache_creation: self.input_cache_creation,
                })));
            }
            _ => {}
        }
    }
}

/// Serialize history into the messages-API shape.  Tool results become
/// `tool_result` blocks on user messages; consecutive tool messages merge
/// into one user message so parallel calls satisfy the API contract.
fn build_anthropic_messages(history: &[Message]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    let mut i = 0;
    while i < history.len() {
        let m = &history[i];
        match m.role {
            Role::System => {
                // system content travels in the top-level `system` field
                i += 1;
            }
            Role::Tool => {
                let mut blocks = Vec::new();
                while i < history.len() && history[i].role == Role::Tool {
                    blocks.push(json!({
                        "type": "tool_result",
                        "tool_use_id": history[i].tool_call_id.clone().unwrap_or_default(),
                        "content": history[i].extract_text(""),
                    }));
                    i += 1;
                }
                out.push(json!({ "role": "user", "content": blocks }));
            }
            role => {
                let mut blocks: Vec<Value> = m
                    .content
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::Text { text } if !text.is_empty() => {
                            Some(json!({ "type": "text", "text": text }))
                        }
                        ContentPart::Think { think, encrypted } => Some(json!({
                            "type": "thinking",
                            "thinking": think,
                            "signature": encrypted.clone().unwrap_or_default(),
                        })),
                        ContentPart::ImageUrl { image_url } => Some(json!({
                            "type": "image",
                            "source": { "type": "url", "url": image_url.url },
                        })),
                        _ => None,
                    })
                    .collect();
                if let Some(calls) = &m.tool_calls {
                    for tc in calls {
                        let input: Value = serde_json::from_str(&tc.function.arguments)
                            .unwrap_or_else(|_| json!({}));
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.function.name,
                            "input": input,
                        }));
                    }
                }
                if !blocks.is_empty() {
                    out.push(json!({
                        "role": if role == Role::Assistant { "assistant" } else { "user" },
                        "content": blocks,
                    }));
                }
                i += 1;
            }
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(state: &mut AnthropicSseState, s: &str) -> Vec<Result<StreamEvent, ChatError>> {
        state.buf.push_str(s);
        state.drain()
    }

    #[test]
    fn message_start_yields_id_and_stashes_input_usage() {
        let mut st = AnthropicSseState::default();
        let events = drain(
            &mut st,
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"usage\":{\"input_tokens\":80,\"cache_read_input_tokens\":20}}}\n",
        );
        assert!(matches!(&events[0], Ok(StreamEvent::Id(id)) if id == "msg_1"));
        let events = drain(
            &mut st,
            "data: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":9}}\n",
        );
        match &events[0] {
            Ok(StreamEvent::Usage(u)) => {
                assert_eq!(u.input_other, 80);
                assert_eq!(u.input_cache_read, 20);
                assert_eq!(u.output, 9);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn tool_use_block_becomes_tool_call_then_fragments() {
        let mut st = AnthropicSseState::default();
        let events = drain(
            &mut st,
            concat!(
                "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"add\"}}\n",
                "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"a\\\":2}\"}}\n",
            ),
        );
        assert!(matches!(
            &events[0],
            Ok(StreamEvent::Part(StreamedMessagePart::ToolCall(tc))) if tc.id == "toolu_1"
        ));
        assert!(matches!(
            &events[1],
            Ok(StreamEvent::Part(StreamedMessagePart::ToolCallPart(p)))
                if p.arguments_part == "{\"a\":2}"
        ));
    }

    #[test]
    fn thinking_deltas_map_to_think_parts() {
        let mut st = AnthropicSseState::default();
        let events = drain(
            &mut st,
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"hmm\"}}\n",
        );
        assert!(matches!(
            &events[0],
            Ok(StreamEvent::Part(StreamedMessagePart::Content(ContentPart::Think { think, .. })))
                if think == "hmm"
        ));
    }

    #[test]
    fn consecutive_tool_results_merge_into_one_user_message() {
        let mut t1 = Message::new(Role::Tool, vec![ContentPart::text("one")]);
        t1.tool_call_id = Some("c1".into());
        let mut t2 = Message::new(Role::Tool, vec![ContentPart::text("two")]);
        t2.tool_call_id = Some("c2".into());
        let msgs = build_anthropic_messages(&[t1, t2]);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["role"], "user");
        assert_eq!(msgs[0]["content"].as_array().unwrap().len(), 2);
        assert_eq!(msgs[0]["content"][0]["tool_use_id"], "c1");
        assert_eq!(msgs[0]["content"][1]["tool_use_id"], "c2");
    }

    #[test]
    fn tool_call_arguments_parse_into_input_object() {
        let mut m = Message::assistant("running");
        m.tool_calls = Some(vec![ToolCall::new("c1", "add", "{\"a\":2,\"b\":3}")]);
        let msgs = build_anthropic_messages(&[m]);
        let blocks = msgs[0]["content"].as_array().unwrap();
        assert_eq!(blocks[1]["type"], "tool_use");
        assert_eq!(blocks[1]["input"]["a"], 2);
    }

    #[test]
    fn system_messages_are_excluded_from_the_array() {
        let msgs = build_anthropic_messages(&[Message::system("sys"), Message::user("hi")]);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["role"], "user");
    }
}
