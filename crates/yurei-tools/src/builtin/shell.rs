// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::environment::Environment;
use crate::tool::{parse_params, Tool, ToolContext, ToolError, ToolOk, ToolReturnValue};

/// Combined stdout+stderr larger than this is shortened in the middle so a
/// runaway command cannot blow up the context.
const MAX_OUTPUT_CHARS: usize = 32_000;

#[derive(Deserialize)]
struct Params {
    command: String,
    /// Optional per-call timeout; clamped to the configured maximum.
    timeout_secs: Option<u64>,
}

pub struct ShellTool {
    environment: Arc<Environment>,
    work_dir: PathBuf,
    max_timeout_secs: u64,
}

impl ShellTool {
    pub fn new(environment: Arc<Environment>, work_dir: PathBuf, max_timeout_secs: u64) -> Self {
        Self {
            environment,
            work_dir,
            max_timeout_secs,
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "Shell"
    }

    fn description(&self) -> &str {
        "Run a shell command in the working directory and return its combined \
         output. Commands are executed with the user's login shell. Long \
         output is shortened in the middle."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command line to execute"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Optional timeout in seconds (bounded by the configured maximum)"
                }
            },
            "required": ["command"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolReturnValue {
        let params: Params = match parse_params(args) {
            Ok(p) => p,
            Err(e) => return e.into(),
        };
        let program = params
            .command
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();
        if program.is_empty() {
            return ToolError::validate("command must not be empty").into();
        }

        let approved = ctx
            .approval
            .request(ctx, "Shell", &program, &params.command)
            .await;
        if !approved {
            return ToolError::rejected(&params.command).into();
        }

        let timeout_secs = params
            .timeout_secs
            .map_or(self.max_timeout_secs, |t| t.min(self.max_timeout_secs));
        debug!(command = %params.command, timeout_secs, "running shell command");

        let child = tokio::process::Command::new(&self.environment.shell_path)
            .arg("-c")
            .arg(&params.command)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(c) => c,
            Err(e) => {
                return ToolError::generic(
                    format!("failed to spawn `{}`: {e}", self.environment.shell_name),
                    "Failed to start shell",
                )
                .into()
            }
        };

        let output = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Err(_) => {
                return ToolError::generic(
                    format!("command timed out after {timeout_secs}s"),
                    "Command timed out",
                )
                .into()
            }
            Ok(Err(e)) => {
                return ToolError::generic(format!("command failed: {e}"), "Command failed").into()
            }
            Ok(Ok(o)) => o,
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        let combined = shorten_middle(&combined, MAX_OUTPUT_CHARS);

        if output.status.success() {
            ToolOk::new(combined).into()
        } else {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".into());
            ToolError::generic(
                format!("command exited with status {code}"),
                format!("Exit status {code}"),
            )
            .with_output(combined)
            .into()
        }
    }
}

/// Keep the head and tail of `s`, eliding the middle when it exceeds
/// `max_chars`.
fn shorten_middle(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    let keep = max_chars / 2;
    let head: String = s.chars().take(keep).collect();
    let tail: String = s
        .chars()
        .skip(count - keep)
        .collect();
    format!("{head}\n... [{} chars elided] ...\n{tail}", count - 2 * keep)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
