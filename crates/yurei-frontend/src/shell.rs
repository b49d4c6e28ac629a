// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Interactive line REPL.  Renders like the print front-end but prompts
//! for approvals and supports Ctrl-C cancellation of a running turn.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::debug;

use yurei_core::{run_soul, Soul, SoulError, UserInput, Wire, WireMessage, YureiSoul};
use yurei_model::ContentPart;
use yurei_tools::{ApprovalResponse, ToolReturnValue};

pub async fn run_shell(
    soul: &mut YureiSoul,
    first_input: Option<String>,
    wire_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let model = soul.model_name();
    if model.is_empty() {
        println!("yurei - no model configured; check your config file");
    } else {
        println!("yurei - {model} (type /quit to exit)");
    }

    let mut next_input = first_input;
    loop {
        let input = match next_input.take() {
            Some(i) => i,
            None => {
                print!("yurei> ");
                std::io::stdout().flush()?;
                match read_line().await? {
                    Some(line) => line,
                    None => break, // EOF
                }
            }
        };
        let input = input.trim().to_string();
        if input.is_empty() {
            continue;
        }
        if input == "/quit" || input == "/exit" {
            break;
        }

        run_one_turn(soul, input, wire_file.clone()).await;
        let usage = soul.status().context_usage;
        if usage > 0.0 {
            println!("[context: {:.0}%]", usage * 100.0);
        }
    }
    Ok(())
}

async fn run_one_turn(soul: &mut YureiSoul, input: String, wire_file: Option<PathBuf>) {
    let (cancel_tx, cancel_rx) = oneshot::channel();
    // Ctrl-C cancels the running turn; the watcher is dropped afterwards
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(());
        }
    });

    let result = run_soul(
        soul,
        UserInput::Text(input),
        shell_ui_loop,
        cancel_rx,
        wire_file,
    )
    .await;
    watcher.abort();

    match result {
        Ok(()) => {}
        Err(SoulError::RunCancelled) => eprintln!("\n[cancelled]"),
        Err(SoulError::MaxStepsReached(n)) => {
            eprintln!("\n[stopped: reached the {n}-step limit for one request]")
        }
        Err(e) => eprintln!("\n[error] {e}"),
    }
}

async fn shell_ui_loop(wire: Arc<Wire>) {
    let mut ui = wire.ui_side(true);
    let mut stdout = std::io::stdout();
    while let Ok(msg) = ui.receive().await {
        match &msg {
            WireMessage::ApprovalRequest(req) => {
                let response = prompt_approval(&req.sender, &req.description).await;
                req.resolve(response);
                continue;
            }
            WireMessage::ContentPart(ContentPart::Text { text }) => {
                let _ = write!(stdout, "{text}");
            }
            WireMessage::ContentPart(ContentPart::Think { think, .. }) => {
                // render thinking dimmed-ish, on its own lines
                for line in think.lines() {
                    let _ = writeln!(stdout, "  . {line}");
                }
            }
            WireMessage::ToolCall(tc) => {
                let _ = writeln!(stdout, "\n* {}({})", tc.function.name, tc.function.arguments);
            }
            WireMessage::ToolResult(tr) => {
                let line = match &tr.return_value {
                    ToolReturnValue::Ok(ok) => ok.brief.clone().unwrap_or_else(|| "ok".into()),
                    ToolReturnValue::Error(e) => format!("error: {}", e.brief),
                };
                let _ = writeln!(stdout, "  -> {line}");
            }
            WireMessage::SubagentEvent(e) => {
                if let WireMessage::ContentPart(ContentPart::Text { text }) = &*e.event {
                    for line in text.lines() {
                        let _ = writeln!(stdout, "  | {line}");
                    }
                }
            }
            WireMessage::StepBegin(_) => {
                let _ = writeln!(stdout);
            }
            WireMessage::CompactionBegin(_) => {
                let _ = writeln!(stdout, "[compacting context...]");
            }
            WireMessage::StepInterrupted(_) => {
                debug!("step interrupted");
            }
            _ => {}
        }
        let _ = stdout.flush();
    }
    let _ = writeln!(stdout);
}

async fn prompt_approval(sender: &str, description: &str) -> ApprovalResponse {
    println!("\n{sender} wants to run:");
    println!("  {description}");
    print!("approve? [y]es / [a]lways for this session / [n]o: ");
    let _ = std::io::stdout().flush();
    let answer = read_line().await.ok().flatten().unwrap_or_default();
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => ApprovalResponse::Approve,
        "a" | "always" => ApprovalResponse::ApproveForSession,
        _ => ApprovalResponse::Reject,
    }
}

async fn read_line() -> std::io::Result<Option<String>> {
    let mut line = String::new();
    let mut reader = BufReader::new(tokio::io::stdin());
    match reader.read_line(&mut line).await? {
        0 => Ok(None),
        _ => Ok(Some(line.trim_end_matches(['\r', '\n']).to_string())),
    }
}
