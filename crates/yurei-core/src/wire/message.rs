// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The closed set of messages that travel over the wire, and the
//! `{type, payload}` envelope used whenever a wire message crosses a
//! serialization boundary (the recorder file, subagent event nesting).

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use yurei_model::{ContentPart, ToolCall, ToolCallPart};
use yurei_tools::{ApprovalResponse, Request, ToolResult};

/// User input to a turn: a plain string or pre-built content parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserInput {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl From<&str> for UserInput {
    fn from(s: &str) -> Self {
        UserInput::Text(s.to_string())
    }
}

/// Sent before any other event of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnBegin {
    pub user_input: UserInput,
}

/// Sent before any other event of step `n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepBegin {
    pub n: u32,
}

/// The current step was interrupted by user intervention or an error.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StepInterrupted {}

/// Compaction started; a `CompactionEnd` follows directly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompactionBegin {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompactionEnd {}

/// Soul status snapshot; `None` fields mean "unchanged".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub context_usage: Option<f64>,
}

/// An event from a nested sub-agent wire, wrapped exactly once with the
/// task tool-call that spawned it.
#[derive(Debug, Clone, PartialEq)]
pub struct SubagentEvent {
    pub task_tool_call_id: String,
    pub event: Box<WireMessage>,
}

impl Serialize for SubagentEvent {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("SubagentEvent", 2)?;
        s.serialize_field("task_tool_call_id", &self.task_tool_call_id)?;
        s.serialize_field("event", &WireMessageEnvelope::from_wire_message(&self.event))?;
        s.end()
    }
}

impl<'de> Deserialize<'de> for SubagentEvent {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            task_tool_call_id: String,
            event: WireMessageEnvelope,
        }
        let raw = Raw::deserialize(deserializer)?;
        let event = raw.event.to_wire_message().map_err(serde::de::Error::custom)?;
        Ok(SubagentEvent {
            task_tool_call_id: raw.task_tool_call_id,
            event: Box::new(event),
        })
    }
}

/// In-process resolution channel riding along an approval request.  Not
/// serialized; a request deserialized from a recording cannot be resolved.
#[derive(Clone, Default)]
pub struct Resolver(Arc<Mutex<Option<oneshot::Sender<ApprovalResponse>>>>);

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Resolver(..)")
    }
}

/// A request for user approval before a side-effecting action proceeds.
/// Always routed at the top level, never inside a subagent envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequestMsg {
    pub id: String,
    pub tool_call_id: String,
    pub sender: String,
    pub action: String,
    pub description: String,
    #[serde(skip)]
    resolver: Resolver,
}

impl PartialEq for ApprovalRequestMsg {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.tool_call_id == other.tool_call_id
            && self.sender == other.sender
            && self.action == other.action
            && self.description == other.description
    }
}

impl ApprovalRequestMsg {
    /// Build the wire message from a broker request, returning the channel
    /// end the broker side waits on.
    pub fn channel(request: Request) -> (Self, oneshot::Receiver<ApprovalResponse>) {
        let (tx, rx) = oneshot::channel();
        let msg = Self {
            id: request.id,
            tool_call_id: request.tool_call_id,
            sender: request.sender,
            action: request.action,
            description: request.description,
            resolver: Resolver(Arc::new(Mutex::new(Some(tx)))),
        };
        (msg, rx)
    }

    /// Resolve the request.  Returns `false` when it was already resolved
    /// (or came from a recording).
    pub fn resolve(&self, response: ApprovalResponse) -> bool {
        let Some(tx) = self.resolver.0.lock().expect("resolver poisoned").take() else {
            return false;
        };
        tx.send(response).is_ok()
    }

    pub fn resolved(&self) -> bool {
        self.resolver.0.lock().expect("resolver poisoned").is_none()
    }
}

/// The answer to an approval request, for every wire consumer to observe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequestResolved {
    pub request_id: String,
    pub response: ApprovalResponse,
}

/// Everything that can travel over the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    TurnBegin(TurnBegin),
    StepBegin(StepBegin),
    StepInterrupted(StepInterrupted),
    CompactionBegin(CompactionBegin),
    CompactionEnd(CompactionEnd),
    StatusUpdate(StatusUpdate),
    ContentPart(ContentPart),
    ToolCall(ToolCall),
    ToolCallPart(ToolCallPart),
    ToolResult(ToolResult),
    SubagentEvent(SubagentEvent),
    ApprovalRequest(ApprovalRequestMsg),
    ApprovalRequestResolved(ApprovalRequestResolved),
}

impl WireMessage {
    /// Content parts and tool-call fragments participate in merged-view
    /// coalescing; everything else flushes the merge buffer.
    pub fn is_mergeable(&self) -> bool {
        matches!(
            self,
            WireMessage::ContentPart(_) | WireMessage::ToolCall(_) | WireMessage::ToolCallPart(_)
        )
    }

    /// Merge `other` into `self` under the content-part rules: adjacent
    /// mergeable parts combine, a tool call absorbs its argument
    /// fragments, nothing else merges.
    pub fn merge_in_place(&mut self, other: &WireMessage) -> bool {
        match (self, other) {
            (WireMessage::ContentPart(a), WireMessage::ContentPart(b)) => a.merge_in_place(b),
            (WireMessage::ToolCall(tc), WireMessage::ToolCallPart(p)) => {
                tc.function.arguments.push_str(&p.arguments_part);
                true
            }
            (WireMessage::ToolCallPart(a), WireMessage::ToolCallPart(b)) => {
                a.arguments_part.push_str(&b.arguments_part);
                true
            }
            _ => false,
        }
    }

    /// The envelope type name.  Content parts use their concrete part
    /// class names.
    pub fn type_name(&self) -> &'static str {
        match self {
            WireMessage::TurnBegin(_) => "TurnBegin",
            WireMessage::StepBegin(_) => "StepBegin",
            WireMessage::StepInterrupted(_) => "StepInterrupted",
            WireMessage::CompactionBegin(_) => "CompactionBegin",
            WireMessage::CompactionEnd(_) => "CompactionEnd",
            WireMessage::StatusUpdate(_) => "StatusUpdate",
            WireMessage::ContentPart(part) => match part {
                ContentPart::Text { .. } => "TextPart",
                ContentPart::Think { .. } => "ThinkPart",
                ContentPart::ImageUrl { .. } => "ImageURLPart",
                ContentPart::AudioUrl { .. } => "AudioURLPart",
            },
            WireMessage::ToolCall(_) => "ToolCall",
            WireMessage::ToolCallPart(_) => "ToolCallPart",
            WireMessage::ToolResult(_) => "ToolResult",
            WireMessage::SubagentEvent(_) => "SubagentEvent",
            WireMessage::ApprovalRequest(_) => "ApprovalRequest",
            WireMessage::ApprovalRequestResolved(_) => "ApprovalRequestResolved",
        }
    }
}

#[derive(Debug, Error)]
pub enum WireMessageError {
    #[error("unknown wire message type: {0}")]
    UnknownType(String),
    #[error("invalid wire message payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// `{type, payload}` rendering of a wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessageEnvelope {
    #[serde(rename = "type")]
    pub type_name: String,
    pub payload: serde_json::Value,
}

impl WireMessageEnvelope {
    pub fn from_wire_message(msg: &WireMessage) -> Self {
        let payload = match msg {
            WireMessage::TurnBegin(m) => serde_json::to_value(m),
            WireMessage::StepBegin(m) => serde_json::to_value(m),
            WireMessage::StepInterrupted(m) => serde_json::to_value(m),
            WireMessage::CompactionBegin(m) => serde_json::to_value(m),
            WireMessage::CompactionEnd(m) => serde_json::to_value(m),
            WireMessage::StatusUpdate(m) => serde_json::to_value(m),
            WireMessage::ContentPart(m) => serde_json::to_value(m),
            WireMessage::ToolCall(m) => serde_json::to_value(m),
            WireMessage::ToolCallPart(m) => serde_json::to_value(m),
            WireMessage::ToolResult(m) => serde_json::to_value(m),
            WireMessage::SubagentEvent(m) => serde_json::to_value(m),
            WireMessage::ApprovalRequest(m) => serde_json::to_value(m),
            WireMessage::ApprovalRequestResolved(m) => serde_json::to_value(m),
        }
        .expect("wire messages are always serializable");
        Self {
            type_name: msg.type_name().to_string(),
            payload,
        }
    }

    pub fn to_wire_message(&self) -> Result<WireMessage, WireMessageError> {
        let p = self.payload.clone();
        Ok(match self.type_name.as_str() {
            "TurnBegin" => WireMessage::TurnBegin(serde_json::from_value(p)?),
            "StepBegin" => WireMessage::StepBegin(serde_json::from_value(p)?),
            "StepInterrupted" => WireMessage::StepInterrupted(serde_json::from_value(p)?),
            "CompactionBegin" => WireMessage::CompactionBegin(serde_json::from_value(p)?),
            "CompactionEnd" => WireMessage::CompactionEnd(serde_json::from_value(p)?),
            "StatusUpdate" => WireMessage::StatusUpdate(serde_json::from_value(p)?),
            "TextPart" | "ThinkPart" | "ImageURLPart" | "AudioURLPart" => {
                WireMessage::ContentPart(serde_json::from_value(p)?)
            }
            "ToolCall" => WireMessage::ToolCall(serde_json::from_value(p)?),
            "ToolCallPart" => WireMessage::ToolCallPart(serde_json::from_value(p)?),
            "ToolResult" => WireMessage::ToolResult(serde_json::from_value(p)?),
            "SubagentEvent" => WireMessage::SubagentEvent(serde_json::from_value(p)?),
            "ApprovalRequest" => WireMessage::ApprovalRequest(serde_json::from_value(p)?),
            "ApprovalRequestResolved" => {
                WireMessage::ApprovalRequestResolved(serde_json::from_value(p)?)
            }
            other => return Err(WireMessageError::UnknownType(other.to_string())),
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
