// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Google GenAI driver (`streamGenerateContent`).
//!
//! Gemini streams complete `functionCall` parts (no argument fragments) and
//! has no tool-call ids, so ids are synthesized from the call ordinal.

use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use async_trait::async_trait;

use crate::message::{ContentPart, Message, Role, StreamedMessagePart, ToolCall};
use crate::provider::{ChatError, ChatProvider, EventStream, StreamEvent, TokenUsage, ToolSchema};

pub const DEFAULT_GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GoogleGenAI {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GoogleGenAI {
    pub fn new(model: String, base_url: Option<&str>, api_key: String) -> Self {
        Self {
            model,
            api_key,
            base_url: base_url
                .unwrap_or(DEFAULT_GOOGLE_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatProvider for GoogleGenAI {
    fn name(&self) -> &'static str {
        "google_genai"
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
        let contents = build_contents(history);
        let mut body = json!({ "contents": contents });
        if !system_prompt.is_empty() {
            body["system_instruction"] = json!({ "parts": [{ "text": system_prompt }] });
        }
        if !tools.is_empty() {
            let declarations: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!([{ "function_declarations": declarations }]);
        }

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        debug!(model = %self.model, "sending genai request");

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
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
            .scan(GenAiState::default(), |state, chunk| {
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
struct GenAiState {
    buf: String,
    call_ordinal: usize,
    usage: Option<TokenUsage>,
}

impl GenAiState {
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
            self.parse_chunk(&v, &mut events);
        }
        events
    }

    fn parse_chunk(&mut self, v: &Value, out: &mut Vec<Result<StreamEvent, ChatError>>) {
        if let Some(parts) = v["candidates"][0]["content"]["parts"].as_array() {
            for part in parts {
                if let Some(text) = part["text"].as_str().filter(|t| !t.is_empty()) {
                    if part["thought"].as_bool().unwrap_or(false) {
                        out.push(Ok(StreamEvent::Part(StreamedMessagePart::Content(
                            ContentPart::think(text),
                        ))));
                    } else {
                        out.push(Ok(StreamEvent::Part(StreamedMessagePart::Content(
                            ContentPart::text(text),
                        ))));
                    }
                }
                if let Some(call) = part.get("functionCall") {
                    let name = call["name"].as_str().unwrap_or("");
                    let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
                    let id = format!("{}-{}", name, self.call_ordinal);
                    self.call_ordinal += 1;
                    out.push(Ok(StreamEvent::Part(StreamedMessagePart::ToolCall(
                        ToolCall::new(id, name, args.to_string()),
                    ))));
                }
            }
        }
        if let Some(usage) = v.get("usageMetadata") {
            let prompt = usage["promptTokenCount"].as_u64().unwrap_or(0);
            let cached = usage["cachedContentTokenCount"].as_u64().unwrap_or(0);
            // the final chunk carries the authoritative counts; keep the
            // latest and emit it when the candidate finishes
            self.usage = Some(TokenUsage {
                input_other: prompt.saturating_sub(cached),
                output: usage["candidatesTokenCount"].as_u64().unwrap_or(0),
                input_cache_read: cached,
                input_cache_creation: 0,
            });
        }
        if v["candidates"][0]["finishReason"].as_str().is_some() {
            if let Some(u) = self.usage.take() {
                out.push(Ok(StreamEvent::Usage(u)));
            }
        }
    }
}

fn build_contents(history: &[Message]) -> Vec<Value> {
    let mut out = Vec::new();
    for m in history {
        match m.role {
            Role::System => continue,
            Role::Tool => {
                out.push(json!({
                    "role": "user",
                    "parts": [{
                        "functionResponse": {
                            "name": m.name.clone().or_else(|| m.tool_call_id.clone()).unwrap_or_default(),
                            "response": { "result": m.extract_text("") },
                        }
                    }]
                }));
            }
            role => {
                let mut parts: Vec<Value> = m
                    .content
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::Text { text } if !text.is_empty() => {
                            Some(json!({ "text": text }))
                        }
                        ContentPart::ImageUrl { image_url } => Some(json!({
                            "file_data": { "file_uri": image_url.url }
                        })),
                        _ => None,
                    })
                    .collect();
                if let Some(calls) = &m.tool_calls {
                    for tc in calls {
                        let args: Value = serde_json::from_str(&tc.function.arguments)
                            .unwrap_or_else(|_| json!({}));
                        parts.push(json!({
                            "functionCall": { "name": tc.function.name, "args": args }
                        }));
                    }
                }
                if parts.is_empty() {
                    continue;
                }
                out.push(json!({
                    "role": if role == Role::Assistant { "model" } else { "user" },
                    "parts": parts,
                }));
            }
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(state: &mut GenAiState, s: &str) -> Vec<Result<StreamEvent, ChatError>> {
        state.buf.push_str(s);
        state.drain()
    }

    #[test]
    fn text_chunk_parses() {
        let mut st = GenAiState::default();
        let events = drain(
            &mut st,
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"hello\"}]}}]}\n",
        );
        assert!(matches!(
            &events[0],
            Ok(StreamEvent::Part(StreamedMessagePart::Content(ContentPart::Text { text })))
                if text == "hello"
        ));
    }

    #[test]
    fn function_call_gets_synthesized_id() {
        let mut st = GenAiState::default();
        let events = drain(
            &mut st,
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"functionCall\":{\"name\":\"add\",\"args\":{\"a\":2}}}]}}]}\n",
        );
        match &events[0] {
            Ok(StreamEvent::Part(StreamedMessagePart::ToolCall(tc))) => {
                assert_eq!(tc.id, "add-0");
                assert_eq!(tc.function.name, "add");
                assert!(tc.function.arguments.contains("\"a\":2"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn usage_is_emitted_at_finish() {
        let mut st = GenAiState::default();
        let events = drain(
            &mut st,
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"x\"}]},\"finishReason\":\"STOP\"}],\"usageMetadata\":{\"promptTokenCount\":30,\"candidatesTokenCount\":5}}\n",
        );
        assert!(events
            .iter()
            .any(|e| matches!(e, Ok(StreamEvent::Usage(u)) if u.output == 5 && u.input_other == 30)));
    }

    #[test]
    fn tool_results_become_function_responses() {
        let mut m = Message::new(Role::Tool, vec![ContentPart::text("5")]);
        m.tool_call_id = Some("add-0".into());
        let contents = build_contents(&[m]);
        assert_eq!(contents[0]["parts"][0]["functionResponse"]["response"]["result"], "5");
    }
}
