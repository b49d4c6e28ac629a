// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The conversation message model.
//!
//! Messages are the atoms of both the persisted context file and the wire.
//! Content is an ordered list of tagged parts; adjacent parts of the same
//! mergeable kind combine via [`merge`] so that a fully streamed message is
//! stored maximally coalesced.  Serialization is stable: a message is equal
//! to what deserializing its own JSON produces.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A single content part, discriminated by an explicit `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// Model chain-of-thought.  `encrypted` carries the provider's opaque
    /// signature blob when the thinking block must be replayed verbatim.
    Think {
        think: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        encrypted: Option<String>,
    },
    ImageUrl {
        image_url: ImageUrl,
    },
    AudioUrl {
        audio_url: AudioUrl,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn think(think: impl Into<String>) -> Self {
        Self::Think {
            think: think.into(),
            encrypted: None,
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl {
                url: url.into(),
                id: None,
            },
        }
    }

    pub fn audio(url: impl Into<String>) -> Self {
        Self::AudioUrl {
            audio_url: AudioUrl {
                url: url.into(),
                id: None,
            },
        }
    }

    /// Try to merge `other` into `self`.  Text merges with text, think
    /// merges with think (last non-null `encrypted` wins); image and audio
    /// parts never merge.
    pub fn merge_in_place(&mut self, other: &ContentPart) -> bool {
        match (self, other) {
            (ContentPart::Text { text: a }, ContentPart::Text { text: b }) => {
                a.push_str(b);
                true
            }
            (
                ContentPart::Think {
                    think: a,
                    encrypted: ea,
                },
                ContentPart::Think {
                    think: b,
                    encrypted: eb,
                },
            ) => {
                a.push_str(b);
                if eb.is_some() {
                    *ea = eb.clone();
                }
                true
            }
            _ => false,
        }
    }
}

fn function_kind() -> String {
    "function".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionBody {
    pub name: String,
    /// JSON-encoded argument object, accumulated across stream fragments.
    pub arguments: String,
}

/// A complete tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub id: String,
    pub function: FunctionBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<serde_json::Value>,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            kind: function_kind(),
            id: id.into(),
            function: FunctionBody {
                name: name.into(),
                arguments: arguments.into(),
            },
            extras: None,
        }
    }
}

/// A streamed fragment of a previously announced tool call's arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPart {
    pub arguments_part: String,
}

/// One item of a provider stream: a content part, a new tool call, or an
/// argument fragment extending the last tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamedMessagePart {
    Content(ContentPart),
    ToolCall(ToolCall),
    ToolCallPart(ToolCallPart),
}

impl StreamedMessagePart {
    /// Merge `other` into `self` when the kinds allow it: content merges
    /// per [`ContentPart::merge_in_place`]; a tool call absorbs argument
    /// fragments; two tool calls never merge.
    pub fn merge_in_place(&mut self, other: &StreamedMessagePart) -> bool {
        match (self, other) {
            (StreamedMessagePart::Content(a), StreamedMessagePart::Content(b)) => {
                a.merge_in_place(b)
            }
            (StreamedMessagePart::ToolCall(tc), StreamedMessagePart::ToolCallPart(p)) => {
                tc.function.arguments.push_str(&p.arguments_part);
                true
            }
            (StreamedMessagePart::ToolCallPart(a), StreamedMessagePart::ToolCallPart(b)) => {
                a.arguments_part.push_str(&b.arguments_part);
                true
            }
            _ => false,
        }
    }
}

/// A single conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(with = "content_serde", default)]
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Set only on role=tool messages, linking back to the invoking call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Set when the message was cut short by cancellation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            name: None,
            partial: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentPart::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentPart::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentPart::text(text)])
    }

    /// Join the text of all plain text parts, ignoring think/image/audio.
    pub fn extract_text(&self, sep: &str) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(sep)
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.tool_calls.as_ref().map_or(true, |t| t.is_empty())
    }
}

/// `content` serializes as a plain string when it is exactly one text part
/// (the form downstream chat APIs prefer) and as a part array otherwise;
/// `null` deserializes to the empty list.
mod content_serde {
    use super::*;

    pub fn serialize<S: Serializer>(parts: &[ContentPart], s: S) -> Result<S::Ok, S::Error> {
        if let [ContentPart::Text { text }] = parts {
            return s.serialize_str(text);
        }
        parts.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ContentPart>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Parts(Vec<ContentPart>),
            One(ContentPart),
        }
        Ok(match Option::<Repr>::deserialize(d)? {
            None => Vec::new(),
            Some(Repr::Text(t)) => vec![ContentPart::text(t)],
            Some(Repr::Parts(parts)) => parts,
            Some(Repr::One(part)) => vec![part],
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
