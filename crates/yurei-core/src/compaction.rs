// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Context compaction: fold old history into a summarization call.

use tracing::debug;

use yurei_model::{generate, ChatError, ContentPart, Llm, Message, Role};

use crate::message::system_part;
use crate::prompts;

/// Everything older than the last `max_preserved_messages` user/assistant
/// messages is folded into one summarization call; the tail survives
/// verbatim.
pub struct SimpleCompaction {
    pub max_preserved_messages: usize,
}

impl Default for SimpleCompaction {
    fn default() -> Self {
        Self {
            max_preserved_messages: 2,
        }
    }
}

pub struct PrepareResult {
    /// The single synthetic user message feeding the compaction call;
    /// `None` when there is nothing worth compacting.
    pub compact_message: Option<Message>,
    pub to_preserve: Vec<Message>,
}

impl SimpleCompaction {
    pub fn new(max_preserved_messages: usize) -> Self {
        Self {
            max_preserved_messages,
        }
    }

    /// Compact `messages`, returning the replacement history.  The
    /// intermediate call runs with zero tools and is never persisted.
    pub async fn compact(&self, messages: &[Message], llm: &Llm) -> Result<Vec<Message>, ChatError> {
        let PrepareResult {
            compact_message,
            to_preserve,
        } = self.prepare(messages);
        let Some(compact_message) = compact_message else {
            return Ok(to_preserve);
        };

        debug!("compacting context");
        let result = generate(
            llm.provider.as_ref(),
            "You are a helpful assistant that compacts conversation context.",
            &[],
            &[compact_message],
            |_| {},
        )
        .await?;
        if let Some(usage) = &result.usage {
            debug!(
                input = usage.input_other,
                output = usage.output,
                "compaction token usage"
            );
        }

        let mut content = vec![system_part(prompts::COMPACTED_PREFIX)];
        content.extend(
            result
                .message
                .content
                .into_iter()
                .filter(|p| !matches!(p, ContentPart::Think { .. })),
        );
        let mut compacted = vec![Message::new(Role::User, content)];
        compacted.extend(to_preserve);
        Ok(compacted)
    }

    /// Split the history and build the synthetic compaction input.  Each
    /// old message is labelled with its ordinal and role; think parts are
    /// stripped.
    pub fn prepare(&self, messages: &[Message]) -> PrepareResult {
        if messages.is_empty() || self.max_preserved_messages == 0 {
            return PrepareResult {
                compact_message: None,
                to_preserve: messages.to_vec(),
            };
        }

        let mut preserve_start = messages.len();
        let mut n_preserved = 0;
        for (index, message) in messages.iter().enumerate().rev() {
            if matches!(message.role, Role::User | Role::Assistant) {
                n_preserved += 1;
                if n_preserved == self.max_preserved_messages {
                    preserve_start = index;
                    break;
                }
            }
        }
        if n_preserved < self.max_preserved_messages {
            return PrepareResult {
                compact_message: None,
                to_preserve: messages.to_vec(),
            };
        }

        let (to_compact, to_preserve) = messages.split_at(preserve_start);
        if to_compact.is_empty() {
            return PrepareResult {
                compact_message: None,
                to_preserve: to_preserve.to_vec(),
            };
        }

        let mut content: Vec<ContentPart> = Vec::new();
        for (i, message) in to_compact.iter().enumerate() {
            content.push(ContentPart::text(format!(
                "## Message {}\nRole: {}\nContent:\n",
                i + 1,
                role_label(message.role)
            )));
            content.extend(
                message
                    .content
                    .iter()
                    .filter(|p| !matches!(p, ContentPart::Think { .. }))
                    .cloned(),
            );
        }
        content.push(ContentPart::text(format!("\n{}", prompts::COMPACT)));

        PrepareResult {
            compact_message: Some(Message::new(Role::User, content)),
            to_preserve: to_preserve.to_vec(),
        }
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
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
    use std::collections::HashSet;
    use std::sync::Arc;
    use yurei_model::ScriptedProvider;

    fn history(n_pairs: usize) -> Vec<Message> {
        let mut msgs = vec![Message::system("sys")];
        for i in 0..n_pairs {
            msgs.push(Message::user(format!("question {i}")));
            msgs.push(Message::assistant(format!("answer {i}")));
        }
        msgs
    }

    #[test]
    fn short_history_is_not_compacted() {
        let c = SimpleCompaction::default();
        let msgs = vec![Message::user("only one")];
        let result = c.prepare(&msgs);
        assert!(result.compact_message.is_none());
        assert_eq!(result.to_preserve.len(), 1);
    }

    #[test]
    fn prepare_splits_off_the_last_two_turns() {
        let c = SimpleCompaction::default();
        let msgs = history(3); // system + 6 messages
        let result = c.prepare(&msgs);
        let compact = result.compact_message.unwrap();
        // the tail: last user/assistant pair
        assert_eq!(result.to_preserve.len(), 2);
        assert_eq!(result.to_preserve[0].extract_text(""), "question 2");
        // the synthetic message labels each compacted message
        let text = compact.extract_text("");
        assert!(text.contains("## Message 1\nRole: system"));
        assert!(text.contains("## Message 2\nRole: user"));
        assert!(text.contains(prompts::COMPACT));
    }

    #[test]
    fn think_parts_are_stripped_from_the_compaction_input() {
        let c = SimpleCompaction::default();
        let mut msgs = history(2);
        msgs.insert(
            1,
            Message::new(
                Role::Assistant,
                vec![ContentPart::think("secret"), ContentPart::text("visible")],
            ),
        );
        let result = c.prepare(&msgs);
        let text = result.compact_message.unwrap().extract_text("");
        assert!(!text.contains("secret"));
        assert!(text.contains("visible"));
    }

    #[tokio::test]
    async fn compact_replaces_history_with_summary_plus_tail() {
        let provider = Arc::new(ScriptedProvider::always_text("the summary"));
        let llm = Llm {
            provider,
            max_context_size: 1000,
            capabilities: HashSet::new(),
        };
        let c = SimpleCompaction::default();
        let msgs = history(3);
        let compacted = c.compact(&msgs, &llm).await.unwrap();
        // [synthetic user message, preserved user, preserved assistant]
        assert_eq!(compacted.len(), 3);
        assert_eq!(compacted[0].role, Role::User);
        let lead = compacted[0].extract_text("");
        assert!(lead.contains("compacted"));
        assert!(lead.contains("the summary"));
        assert_eq!(compacted[1].extract_text(""), "question 2");
        assert_eq!(compacted[2].extract_text(""), "answer 2");
    }

    #[tokio::test]
    async fn nothing_to_compact_passes_history_through() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let llm = Llm {
            provider,
            max_context_size: 1000,
            capabilities: HashSet::new(),
        };
        let c = SimpleCompaction::default();
        let msgs = vec![Message::user("hi"), Message::assistant("hello")];
        // no provider call happens, so the empty script queue is fine
        let out = c.compact(&msgs, &llm).await.unwrap();
        assert_eq!(out, msgs);
    }
}
