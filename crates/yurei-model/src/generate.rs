// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use futures::StreamExt;

use crate::message::{Message, Role, StreamedMessagePart};
use crate::provider::{ChatError, ChatProvider, StreamEvent, TokenUsage, ToolSchema};

/// The result of one generation: the fully merged assistant message plus
/// the stream's id and usage, when the provider reported them.
#[derive(Debug, Clone)]
pub struct GenerateResult {
    pub id: Option<String>,
    pub message: Message,
    pub usage: Option<TokenUsage>,
}

/// Generate one assistant message.
///
/// Every raw part is handed to `on_part` in arrival order before merging.
/// Adjacent mergeable parts are coalesced into a pending buffer so the
/// returned message contains maximally merged content and complete tool
/// calls.  A response with neither content nor tool calls is
/// [`ChatError::EmptyResponse`].
pub async fn generate<F>(
    provider: &dyn ChatProvider,
    system_prompt: &str,
    tools: &[ToolSchema],
    history: &[Message],
    mut on_part: F,
) -> Result<GenerateResult, ChatError>
where
    F: FnMut(&StreamedMessagePart),
{
    let mut stream = provider.generate(system_prompt, tools, history).await?;

    let mut message = Message::new(Role::Assistant, Vec::new());
    let mut pending: Option<StreamedMessagePart> = None;
    let mut id: Option<String> = None;
    let mut usage: Option<TokenUsage> = None;

    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Id(i) => id = Some(i),
            StreamEvent::Usage(u) => usage = Some(u),
            StreamEvent::Part(part) => {
                on_part(&part);
                let absorbed = match &mut pending {
                    Some(p) => p.merge_in_place(&part),
                    None => false,
                };
                if !absorbed {
                    // an unmergeable part pushes the pending one out
                    if let Some(complete) = pending.take() {
                        message_append(&mut message, complete);
                    }
                    pending = Some(part);
                }
            }
        }
    }
    if let Some(p) = pending.take() {
        message_append(&mut message, p);
    }

    if message.is_empty() {
        return Err(ChatError::EmptyResponse);
    }
    Ok(GenerateResult { id, message, usage })
}

fn message_append(message: &mut Message, part: StreamedMessagePart) {
    match part {
        StreamedMessagePart::Content(p) => message.content.push(p),
        StreamedMessagePart::ToolCall(tc) => {
            message.tool_calls.get_or_insert_with(Vec::new).push(tc);
        }
        // an argument fragment with no preceding tool call is orphaned
        StreamedMessagePart::ToolCallPart(_) => {}
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ContentPart, ToolCall, ToolCallPart};
    use crate::mock::ScriptedProvider;

    fn part(p: ContentPart) -> Result<StreamEvent, ChatError> {
        Ok(StreamEvent::Part(StreamedMessagePart::Content(p)))
    }

    #[tokio::test]
    async fn adjacent_text_parts_are_merged() {
        let provider = ScriptedProvider::new(vec![vec![
            part(ContentPart::text("Hel")),
            part(ContentPart::text("lo")),
            Ok(StreamEvent::Usage(TokenUsage {
                input_other: 3,
                output: 2,
                ..Default::default()
            })),
        ]]);
        let mut raw = Vec::new();
        let result = generate(&provider, "", &[], &[], |p| raw.push(p.clone()))
            .await
            .unwrap();
        assert_eq!(result.message.content, vec![ContentPart::text("Hello")]);
        assert_eq!(raw.len(), 2, "raw callback sees unmerged parts");
        assert_eq!(result.usage.unwrap().total(), 5);
    }

    #[tokio::test]
    async fn tool_call_fragments_assemble_into_one_call() {
        let provider = ScriptedProvider::new(vec![vec![
            part(ContentPart::text("calling now")),
            Ok(StreamEvent::Part(StreamedMessagePart::ToolCall(
                ToolCall::new("c1", "add", ""),
            ))),
            Ok(StreamEvent::Part(StreamedMessagePart::ToolCallPart(
                ToolCallPart {
                    arguments_part: "{\"a\":2,".into(),
                },
            ))),
            Ok(StreamEvent::Part(StreamedMessagePart::ToolCallPart(
                ToolCallPart {
                    arguments_part: "\"b\":3}".into(),
                },
            ))),
        ]]);
        let result = generate(&provider, "", &[], &[], |_| {}).await.unwrap();
        let calls = result.message.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].function.arguments, "{\"a\":2,\"b\":3}");
        assert_eq!(result.message.extract_text(""), "calling now");
    }

    #[tokio::test]
    async fn two_tool_calls_stay_separate() {
        let provider = ScriptedProvider::new(vec![vec![
            Ok(StreamEvent::Part(StreamedMessagePart::ToolCall(
                ToolCall::new("c1", "add", "{}"),
            ))),
            Ok(StreamEvent::Part(StreamedMessagePart::ToolCall(
                ToolCall::new("c2", "sub", "{}"),
            ))),
        ]]);
        let result = generate(&provider, "", &[], &[], |_| {}).await.unwrap();
        let calls = result.message.tool_calls.unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[1].id, "c2");
    }

    #[tokio::test]
    async fn empty_stream_is_empty_response() {
        let provider = ScriptedProvider::new(vec![vec![]]);
        let err = generate(&provider, "", &[], &[], |_| {}).await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyResponse));
    }

    #[tokio::test]
    async fn stream_id_is_captured() {
        let provider = ScriptedProvider::new(vec![vec![
            Ok(StreamEvent::Id("msg_42".into())),
            part(ContentPart::text("hi")),
        ]]);
        let result = generate(&provider, "", &[], &[], |_| {}).await.unwrap();
        assert_eq!(result.id.as_deref(), Some("msg_42"));
    }

    #[tokio::test]
    async fn stream_error_propagates() {
        let provider = ScriptedProvider::new(vec![vec![
            part(ContentPart::text("partial")),
            Err(ChatError::Status {
                status: 500,
                message: "boom".into(),
            }),
        ]]);
        let err = generate(&provider, "", &[], &[], |_| {}).await.unwrap_err();
        assert!(matches!(err, ChatError::Status { status: 500, .. }));
    }
}
