// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use yurei_model::{ContentPart, ToolCall};

use crate::approval::Approval;

/// Per-invocation context, constructed by the toolset and passed explicitly
/// to the tool.  There is no global "current tool call" state; everything a
/// tool may need to identify itself travels here.
#[derive(Clone)]
pub struct ToolContext {
    pub tool_call: ToolCall,
    pub approval: Arc<Approval>,
}

impl ToolContext {
    pub fn tool_call_id(&self) -> &str {
        &self.tool_call.id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_call.function.name
    }
}

/// Tool output: either a plain string or structured content parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl ToolOutput {
    pub fn is_empty(&self) -> bool {
        match self {
            ToolOutput::Text(t) => t.is_empty(),
            ToolOutput::Parts(p) => p.is_empty(),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(s: String) -> Self {
        ToolOutput::Text(s)
    }
}

impl From<&str> for ToolOutput {
    fn from(s: &str) -> Self {
        ToolOutput::Text(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    NotFound,
    ParseError,
    ValidateError,
    RuntimeError,
    Rejected,
    Generic,
}

/// A successful tool return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOk {
    pub output: ToolOutput,
    /// Out-of-band note for the model, rendered inside a `<system>` tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Short human-facing summary for the UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brief: Option<String>,
}

impl ToolOk {
    pub fn new(output: impl Into<ToolOutput>) -> Self {
        Self {
            output: output.into(),
            message: None,
            brief: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_brief(mut self, brief: impl Into<String>) -> Self {
        self.brief = Some(brief.into());
        self
    }
}

/// A failed tool return.  The kind tells the step-loop (and tests) what
/// went wrong; the message is fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
    pub brief: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ToolOutput>,
}

impl ToolError {
    pub fn not_found(tool_name: &str) -> Self {
        Self {
            kind: ToolErrorKind::NotFound,
            message: format!("Tool `{tool_name}` not found"),
            brief: format!("Tool `{tool_name}` not found"),
            output: None,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: ToolErrorKind::ParseError,
            message: message.into(),
            brief: "Invalid tool arguments".into(),
            output: None,
        }
    }

    pub fn validate(message: impl Into<String>) -> Self {
        Self {
            kind: ToolErrorKind::ValidateError,
            message: message.into(),
            brief: "Tool arguments failed validation".into(),
            output: None,
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self {
            kind: ToolErrorKind::RuntimeError,
            message: message.into(),
            brief: "Tool failed unexpectedly".into(),
            output: None,
        }
    }

    pub fn rejected(action: &str) -> Self {
        Self {
            kind: ToolErrorKind::Rejected,
            message: format!("The user rejected the action: {action}"),
            brief: "Action rejected".into(),
            output: None,
        }
    }

    pub fn generic(message: impl Into<String>, brief: impl Into<String>) -> Self {
        Self {
            kind: ToolErrorKind::Generic,
            message: message.into(),
            brief: brief.into(),
            output: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<ToolOutput>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// What a tool call resolves to.  `Error` is listed first so untagged
/// deserialization keys off the required `kind` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolReturnValue {
    Error(ToolError),
    Ok(ToolOk),
}

impl ToolReturnValue {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolReturnValue::Error(_))
    }
}

impl From<ToolOk> for ToolReturnValue {
    fn from(ok: ToolOk) -> Self {
        ToolReturnValue::Ok(ok)
    }
}

impl From<ToolError> for ToolReturnValue {
    fn from(err: ToolError) -> Self {
        ToolReturnValue::Error(err)
    }
}

/// The resolved outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub return_value: ToolReturnValue,
}

/// Trait every tool implements.
///
/// `parameters` is the JSON Schema of the arguments object; `call` receives
/// the decoded arguments and the per-invocation context.  Failures are
/// returned, never panicked — a panicking tool is wrapped into a
/// `RuntimeError` result by the dispatcher.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value;
    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolReturnValue;
}

/// Decode typed parameters from the argument value; schema mismatches
/// surface as `ValidateError`.
pub fn parse_params<P: DeserializeOwned>(args: Value) -> Result<P, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::validate(e.to_string()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn return_value_ok_round_trips() {
        let v: ToolReturnValue = ToolOk::new("5").with_message("done").into();
        let j = serde_json::to_value(&v).unwrap();
        assert_eq!(j, json!({"output": "5", "message": "done"}));
        let back: ToolReturnValue = serde_json::from_value(j).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn return_value_error_round_trips() {
        let v: ToolReturnValue = ToolError::rejected("rm -rf /").into();
        let j = serde_json::to_value(&v).unwrap();
        assert_eq!(j["kind"], json!("rejected"));
        let back: ToolReturnValue = serde_json::from_value(j).unwrap();
        assert_eq!(back, v);
        assert!(back.is_error());
    }

    #[test]
    fn tool_result_round_trips() {
        let r = ToolResult {
            tool_call_id: "c1".into(),
            return_value: ToolOk::new("out").into(),
        };
        let j = serde_json::to_string(&r).unwrap();
        let back: ToolResult = serde_json::from_str(&j).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn parse_params_validates() {
        #[derive(Deserialize)]
        struct P {
            a: i64,
        }
        let p: P = parse_params(json!({"a": 2})).unwrap();
        assert_eq!(p.a, 2);
        let err = parse_params::<P>(json!({"a": "two"})).unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::ValidateError);
    }

    #[test]
    fn structured_output_round_trips() {
        let v: ToolReturnValue =
            ToolOk::new(ToolOutput::Parts(vec![ContentPart::text("a")])).into();
        let j = serde_json::to_value(&v).unwrap();
        let back: ToolReturnValue = serde_json::from_value(j).unwrap();
        assert_eq!(back, v);
    }
}
