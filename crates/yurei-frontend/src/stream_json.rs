// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Line-oriented JSON front-end.
//!
//! Stdin supplies `{"role":"user","content":...}` messages, one per line.
//! For every turn, each assistant message is emitted as Message JSON on
//! stdout at its step boundary, and each tool result as a tool-role
//! message as it completes.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use yurei_core::{
    run_soul, tool_result_to_message, SoulError, UserInput, Wire, WireMessage, YureiSoul,
};
use yurei_model::{ContentPart, Message, Role, ToolCall};
use yurei_tools::ApprovalResponse;

#[derive(Deserialize)]
struct InputLine {
    role: String,
    content: InputContent,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InputContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// Read user messages from stdin until EOF, answering each with Message
/// JSON on stdout.
pub async fn run_stream_json(
    soul: &mut YureiSoul,
    wire_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: InputLine = match serde_json::from_str(&line) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "skipping unparseable input line");
                continue;
            }
        };
        if parsed.role != "user" {
            warn!(role = %parsed.role, "ignoring non-user input message");
            continue;
        }
        let input = match parsed.content {
            InputContent::Text(t) => UserInput::Text(t),
            InputContent::Parts(p) => UserInput::Parts(p),
        };

        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let result = run_soul(soul, input, stream_json_ui_loop, cancel_rx, wire_file.clone()).await;
        match result {
            Ok(()) => {}
            Err(e) => {
                // aborts surface as a line, the process keeps serving
                let error = serde_json::json!({ "role": "_error", "message": e.to_string() });
                println!("{error}");
            }
        }
    }
    debug!("stdin closed, exiting stream-json loop");
    Ok(())
}

async fn stream_json_ui_loop(wire: Arc<Wire>) {
    let mut ui = wire.ui_side(true);
    let mut pending: Option<Message> = None;
    while let Ok(msg) = ui.receive().await {
        match msg {
            WireMessage::ContentPart(part) => {
                let message = pending.get_or_insert_with(|| Message::new(Role::Assistant, vec![]));
                push_part(message, part);
            }
            WireMessage::ToolCall(tc) => {
                let message = pending.get_or_insert_with(|| Message::new(Role::Assistant, vec![]));
                push_tool_call(message, tc);
            }
            // a step boundary: flush the assistant message of the
            // previous step
            WireMessage::StepBegin(_) | WireMessage::StepInterrupted(_) => {
                flush(&mut pending);
            }
            WireMessage::ToolResult(result) => {
                flush(&mut pending);
                emit(&tool_result_to_message(&result));
            }
            WireMessage::ApprovalRequest(req) => {
                warn!(action = %req.action, "rejecting approval request in stream-json mode");
                req.resolve(ApprovalResponse::Reject);
            }
            _ => {}
        }
    }
    flush(&mut pending);
}

fn push_part(message: &mut Message, part: ContentPart) {
    if let Some(last) = message.content.last_mut() {
        if last.merge_in_place(&part) {
            return;
        }
    }
    message.content.push(part);
}

fn push_tool_call(message: &mut Message, tool_call: ToolCall) {
    message
        .tool_calls
        .get_or_insert_with(Vec::new)
        .push(tool_call);
}

fn flush(pending: &mut Option<Message>) {
    if let Some(message) = pending.take() {
        if !message.is_empty() {
            emit(&message);
        }
    }
}

fn emit(message: &Message) {
    match serde_json::to_string(message) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "cannot serialize outgoing message"),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
