// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! OpenAI Responses API driver.
//!
//! Unlike chat completions, the Responses protocol streams typed events
//! (`response.output_text.delta`, `response.output_item.added`, …) and
//! takes the conversation as a flat list of input items.

use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use async_trait::async_trait;

use crate::message::{ContentPart, Message, Role, StreamedMessagePart, ToolCall, ToolCallPart};
use crate::provider::{ChatError, ChatProvider, EventStream, StreamEvent, TokenUsage, ToolSchema};

pub struct OpenAIResponses {
    model: String,
    api_key: String,
    responses_url: String,
    client: reqwest::Client,
}

impl OpenAIResponses {
    pub fn new(model: String, base_url: Option<&str>, api_key: String) -> Self {
        let base = base_url
            .unwrap_or(crate::openai_legacy::DEFAULT_OPENAI_BASE_URL)
            .trim_end_matches('/');
        Self {
            model,
            api_key,
            responses_url: format!("{base}/responses"),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAIResponses {
    fn name(&self) -> &'static str {
        "openai_responses"
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
        let input = build_input_items(history);
        let tools_json: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "input": input,
            "stream": true,
        });
        if !system_prompt.is_empty() {
            body["instructions"] = json!(system_prompt);
        }
        if !tools_json.is_empty() {
            body["tools"] = json!(tools_json);
        }

        debug!(model = %self.model, items = input.len(), "sending responses request");

        let resp = self
            .client
            .post(&self.responses_url)
            .bearer_auth(&self.api_key)
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
            .scan(String::new(), |buf, chunk| {
                let events = match chunk {
                    Ok(bytes) => {
                        buf.push_str(&String::from_utf8_lossy(&bytes));
                        drain_lines(buf)
                    }
                    Err(e) => vec![Err(ChatError::from_reqwest(e))],
                };
                std::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);
        Ok(Box::pin(event_stream))
    }
}

fn drain_lines(buf: &mut String) -> Vec<Result<StreamEvent, ChatError>> {
    let mut events = Vec::new();
    while let Some(nl) = buf.find('\n') {
        let line = buf[..nl].trim_end_matches('\r').to_string();
        *buf = buf[nl + 1..].to_string();
        let Some(data) = line.strip_prefix("data: ") else {
            continue;
        };
        let Ok(v) = serde_json::from_str::<Value>(data.trim()) else {
            continue;
        };
        if let Some(ev) = parse_event(&v) {
            events.push(Ok(ev));
        }
    }
    events
}

fn parse_event(v: &Value) -> Option<StreamEvent> {
    match v["type"].as_str()? {
        "response.created" => v["response"]["id"]
            .as_str()
            .map(|id| StreamEvent::Id(id.to_string())),
        "response.output_text.delta" => v["delta"].as_str().map(|d| {
            StreamEvent::Part(StreamedMessagePart::Content(ContentPart::text(d)))
        }),
        "response.reasoning_summary_text.delta" => v["delta"].as_str().map(|d| {
            StreamEvent::Part(StreamedMessagePart::Content(ContentPart::think(d)))
        }),
        "response.output_item.added" => {
            let item = &v["item"];
            if item["type"].as_str() == Some("function_call") {
                Some(StreamEvent::Part(StreamedMessagePart::ToolCall(
                    ToolCall::new(
                        item["call_id"].as_str().unwrap_or(""),
                        item["name"].as_str().unwrap_or(""),
                        item["arguments"].as_str().unwrap_or(""),
                    ),
                )))
            } else {
                None
            }
        }
        "response.function_call_arguments.delta" => v["delta"].as_str().map(|d| {
            StreamEvent::Part(StreamedMessagePart::ToolCallPart(ToolCallPart {
                arguments_part: d.to_string(),
            }))
        }),
        "response.completed" => {
            let usage = &v["response"]["usage"];
            let input = usage["input_tokens"].as_u64().unwrap_or(0);
            let cached = usage["input_tokens_details"]["cached_tokens"]
                .as_u64()
                .unwrap_or(0);
            Some(StreamEvent::Usage(TokenUsage {
                input_other: input.saturating_sub(cached),
                output: usage["output_tokens"].as_u64().unwrap_or(0),
                input_cache_read: cached,
                input_cache_creation: 0,
            }))
        }
        _ => None,
    }
}

/// Flatten the history into Responses-API input items.  System-role
/// messages are skipped: the prompt travels in `instructions` and must
/// reach the API exactly once.
fn build_input_items(history: &[Message]) -> Vec<Value> {
    let mut items = Vec::new();
    for m in history {
        match m.role {
            Role::System => continue,
            Role::Tool => {
                items.push(json!({
                    "type": "function_call_output",
                    "call_id": m.tool_call_id.clone().unwrap_or_default(),
                    "output": m.extract_text(""),
                }));
            }
            role => {
                let text = m.extract_text("");
                if !text.is_empty() || m.tool_calls.is_none() {
                    let kind = if role == Role::Assistant {
                        "output_text"
                    } else {
                        "input_text"
                    };
                    items.push(json!({
                        "role": role_str(role),
                        "content": [{ "type": kind, "text": text }],
                    }));
                }
                if let Some(calls) = &m.tool_calls {
                    for tc in calls {
                        items.push(json!({
                            "type": "function_call",
                            "call_id": tc.id,
                            "name": tc.function.name,
                            "arguments": tc.function.arguments,
                        }));
                    }
                }
            }
        }
    }
    items
}

fn role_str(r: Role) -> &'static str {
    match r {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_text_delta_parses() {
        let v = json!({"type": "response.output_text.delta", "delta": "hi"});
        assert!(matches!(
            parse_event(&v),
            Some(StreamEvent::Part(StreamedMessagePart::Content(ContentPart::Text { text })))
                if text == "hi"
        ));
    }

    #[test]
    fn function_call_item_becomes_tool_call() {
        let v = json!({
            "type": "response.output_item.added",
            "item": {"type": "function_call", "call_id": "c1", "name": "add", "arguments": ""}
        });
        assert!(matches!(
            parse_event(&v),
            Some(StreamEvent::Part(StreamedMessagePart::ToolCall(tc))) if tc.id == "c1"
        ));
    }

    #[test]
    fn completed_event_carries_usage() {
        let v = json!({
            "type": "response.completed",
            "response": {"usage": {
                "input_tokens": 100,
                "output_tokens": 20,
                "input_tokens_details": {"cached_tokens": 60}
            }}
        });
        match parse_event(&v) {
            Some(StreamEvent::Usage(u)) => {
                assert_eq!(u.input_other, 40);
                assert_eq!(u.input_cache_read, 60);
                assert_eq!(u.output, 20);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn tool_result_becomes_function_call_output() {
        let mut m = Message::new(Role::Tool, vec![ContentPart::text("5")]);
        m.tool_call_id = Some("c1".into());
        let items = build_input_items(&[m]);
        assert_eq!(items[0]["type"], "function_call_output");
        assert_eq!(items[0]["call_id"], "c1");
        assert_eq!(items[0]["output"], "5");
    }

    #[test]
    fn system_messages_are_excluded_from_input_items() {
        let items = build_input_items(&[Message::system("sys"), Message::user("hi")]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["role"], "user");
    }

    #[test]
    fn assistant_with_tool_calls_emits_call_items() {
        let mut m = Message::assistant("let me check");
        m.tool_calls = Some(vec![ToolCall::new("c2", "shell", "{}")]);
        let items = build_input_items(&[m]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["role"], "assistant");
        assert_eq!(items[1]["type"], "function_call");
        assert_eq!(items[1]["call_id"], "c2");
    }
}
