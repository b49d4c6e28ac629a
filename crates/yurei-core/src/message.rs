// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashSet;

use yurei_model::{ContentPart, Message, ModelCapability, Role};
use yurei_tools::{ToolErrorKind, ToolOutput, ToolResult, ToolReturnValue};

/// Wrap out-of-band runtime text so the model can tell it apart from real
/// user input.
pub fn system_part(message: &str) -> ContentPart {
    ContentPart::text(format!("<system>{message}</system>"))
}

/// Convert a tool result into a role=tool message.
///
/// Downstream chat APIs reject array content on tool-role messages, so all
/// parts are flattened into a single text part here; non-text parts are
/// stringified as their JSON.
pub fn tool_result_to_message(result: &ToolResult) -> Message {
    let mut content: Vec<ContentPart> = Vec::new();
    match &result.return_value {
        ToolReturnValue::Error(error) => {
            let mut text = format!("ERROR: {}", error.message);
            if error.kind == ToolErrorKind::RuntimeError {
                text.push_str("\nThis is an unexpected error and the tool is probably not working.");
            }
            content.push(system_part(&text));
            if let Some(output) = &error.output {
                content.extend(output_to_parts(output));
            }
        }
        ToolReturnValue::Ok(ok) => {
            if let Some(message) = &ok.message {
                content.push(system_part(message));
            }
            if !ok.output.is_empty() {
                content.extend(output_to_parts(&ok.output));
            }
            if content.is_empty() {
                content.push(system_part("Tool output is empty."));
            }
        }
    }

    let mut message = Message::new(Role::Tool, vec![flatten_to_single_text(content)]);
    message.tool_call_id = Some(result.tool_call_id.clone());
    message
}

fn output_to_parts(output: &ToolOutput) -> Vec<ContentPart> {
    match output {
        ToolOutput::Text(text) if text.is_empty() => vec![],
        ToolOutput::Text(text) => vec![ContentPart::text(text.clone())],
        ToolOutput::Parts(parts) => parts.clone(),
    }
}

fn flatten_to_single_text(parts: Vec<ContentPart>) -> ContentPart {
    let texts: Vec<String> = parts
        .into_iter()
        .map(|part| match part {
            ContentPart::Text { text } => text,
            other => serde_json::to_string(&other).unwrap_or_default(),
        })
        .collect();
    ContentPart::text(texts.join("\n\n"))
}

/// Return the capabilities `message` needs that the model lacks.
pub fn check_message(
    message: &Message,
    model_capabilities: &HashSet<ModelCapability>,
) -> HashSet<ModelCapability> {
    let mut needed = HashSet::new();
    for part in &message.content {
        match part {
            ContentPart::ImageUrl { .. } => {
                needed.insert(ModelCapability::ImageIn);
            }
            ContentPart::Think { .. } => {
                needed.insert(ModelCapability::Thinking);
            }
            _ => {}
        }
    }
    needed.difference(model_capabilities).copied().collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use yurei_tools::{ToolError, ToolOk};

    #[test]
    fn ok_result_flattens_message_and_output() {
        let result = ToolResult {
            tool_call_id: "c1".into(),
            return_value: ToolOk::new("payload").with_message("note").into(),
        };
        let m = tool_result_to_message(&result);
        assert_eq!(m.role, Role::Tool);
        assert_eq!(m.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(m.content.len(), 1, "tool content must be a single part");
        assert_eq!(m.extract_text(""), "<system>note</system>\n\npayload");
    }

    #[test]
    fn empty_ok_result_notes_emptiness() {
        let result = ToolResult {
            tool_call_id: "c1".into(),
            return_value: ToolOk::new("").into(),
        };
        let m = tool_result_to_message(&result);
        assert_eq!(m.extract_text(""), "<system>Tool output is empty.</system>");
    }

    #[test]
    fn error_result_is_tagged_and_runtime_errors_warn() {
        let result = ToolResult {
            tool_call_id: "c1".into(),
            return_value: ToolError::runtime("boom").into(),
        };
        let m = tool_result_to_message(&result);
        let text = m.extract_text("");
        assert!(text.starts_with("<system>ERROR: boom"));
        assert!(text.contains("probably not working"));
    }

    #[test]
    fn error_output_is_preserved() {
        let result = ToolResult {
            tool_call_id: "c1".into(),
            return_value: ToolError::generic("exit status 1", "failed")
                .with_output("stderr text")
                .into(),
        };
        let m = tool_result_to_message(&result);
        assert!(m.extract_text("").contains("stderr text"));
    }

    #[test]
    fn check_message_reports_missing_capabilities() {
        let m = Message::new(
            Role::User,
            vec![ContentPart::text("x"), ContentPart::image("data:...")],
        );
        let missing = check_message(&m, &HashSet::new());
        assert!(missing.contains(&ModelCapability::ImageIn));

        let mut caps = HashSet::new();
        caps.insert(ModelCapability::ImageIn);
        assert!(check_message(&m, &caps).is_empty());
    }

    #[test]
    fn think_parts_need_thinking() {
        let m = Message::new(Role::User, vec![ContentPart::think("hmm")]);
        let missing = check_message(&m, &HashSet::new());
        assert!(missing.contains(&ModelCapability::Thinking));
    }
}
