// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Non-interactive front-end: run one turn, render the merged wire as
//! plain text, exit.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::warn;

use yurei_core::{run_soul, SoulError, UserInput, Wire, WireMessage, YureiSoul};
use yurei_model::ContentPart;
use yurei_tools::{ApprovalResponse, ToolReturnValue};

/// Run a single turn and print the response.  Approval requests are
/// rejected: side effects in print mode require `--yolo`, which bypasses
/// the broker entirely.
pub async fn run_print(
    soul: &mut YureiSoul,
    prompt: &str,
    wire_file: Option<PathBuf>,
) -> Result<(), SoulError> {
    let (_cancel_tx, cancel_rx) = oneshot::channel();
    run_soul(
        soul,
        UserInput::Text(prompt.to_string()),
        print_ui_loop,
        cancel_rx,
        wire_file,
    )
    .await
}

async fn print_ui_loop(wire: Arc<Wire>) {
    let mut ui = wire.ui_side(true);
    let mut stdout = std::io::stdout();
    while let Ok(msg) = ui.receive().await {
        render(&msg, &mut stdout, 0);
        let _ = stdout.flush();
    }
    let _ = writeln!(stdout);
}

fn render(msg: &WireMessage, out: &mut impl std::io::Write, depth: usize) {
    let indent = "  ".repeat(depth);
    match msg {
        WireMessage::ContentPart(ContentPart::Text { text }) => {
            let _ = write!(out, "{text}");
        }
        WireMessage::ContentPart(ContentPart::Think { .. }) => {
            // thinking stays quiet in print mode
        }
        WireMessage::ContentPart(_) => {}
        WireMessage::ToolCall(tc) => {
            let _ = writeln!(
                out,
                "\n{indent}* {}({})",
                tc.function.name,
                summarize(&tc.function.arguments)
            );
        }
        WireMessage::ToolResult(tr) => match &tr.return_value {
            ToolReturnValue::Ok(ok) => {
                let brief = ok.brief.clone().unwrap_or_else(|| "ok".into());
                let _ = writeln!(out, "{indent}  -> {brief}");
            }
            ToolReturnValue::Error(e) => {
                let _ = writeln!(out, "{indent}  -> error: {}", e.brief);
            }
        },
        WireMessage::StepBegin(_) => {
            let _ = writeln!(out);
        }
        WireMessage::StepInterrupted(_) => {
            let _ = writeln!(out, "\n{indent}[interrupted]");
        }
        WireMessage::CompactionBegin(_) => {
            let _ = writeln!(out, "{indent}[compacting context...]");
        }
        WireMessage::CompactionEnd(_) => {
            let _ = writeln!(out, "{indent}[context compacted]");
        }
        WireMessage::SubagentEvent(e) => {
            render(&e.event, out, depth + 1);
        }
        WireMessage::ApprovalRequest(req) => {
            warn!(
                action = %req.action,
                "approval requested in print mode, rejecting (use --yolo to bypass)"
            );
            let _ = writeln!(
                out,
                "{indent}[rejected: {} requires approval; run with --yolo]",
                req.action
            );
            req.resolve(ApprovalResponse::Reject);
        }
        WireMessage::TurnBegin(_)
        | WireMessage::StatusUpdate(_)
        | WireMessage::ToolCallPart(_)
        | WireMessage::ApprovalRequestResolved(_) => {}
    }
}

/// First ~60 chars of the argument JSON, one line.
fn summarize(args: &str) -> String {
    let one_line = args.replace('\n', " ");
    if one_line.chars().count() > 60 {
        let head: String = one_line.chars().take(57).collect();
        format!("{head}...")
    } else {
        one_line
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use yurei_model::ToolCall;
    use yurei_tools::ToolOk;

    #[test]
    fn text_renders_verbatim() {
        let mut out = Vec::new();
        render(
            &WireMessage::ContentPart(ContentPart::text("hello")),
            &mut out,
            0,
        );
        assert_eq!(String::from_utf8(out).unwrap(), "hello");
    }

    #[test]
    fn tool_call_renders_name_and_short_args() {
        let mut out = Vec::new();
        render(
            &WireMessage::ToolCall(ToolCall::new("c1", "Shell", "{\"command\":\"ls\"}")),
            &mut out,
            0,
        );
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Shell"));
        assert!(text.contains("ls"));
    }

    #[test]
    fn subagent_events_are_indented() {
        let mut out = Vec::new();
        let inner = WireMessage::ToolResult(yurei_tools::ToolResult {
            tool_call_id: "c1".into(),
            return_value: ToolOk::new("x").with_brief("done").into(),
        });
        render(
            &WireMessage::SubagentEvent(yurei_core::SubagentEvent {
                task_tool_call_id: "t1".into(),
                event: Box::new(inner),
            }),
            &mut out,
            0,
        );
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("  "), "nested output is indented: {text:?}");
    }

    #[test]
    fn summarize_caps_length() {
        let long = "x".repeat(200);
        assert!(summarize(&long).chars().count() <= 60);
    }
}
