// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Embedded prompts and description templates.

use std::collections::HashMap;

/// System prompt of the builtin default agent.  `${NAME}` placeholders are
/// substituted from the builtin args plus the agent spec's own args.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an AI agent running in a terminal, helping the user with software engineering and general computer tasks.

Current time: ${NOW}
Working directory: ${WORK_DIR}

Directory listing:
${WORK_DIR_LS}

Project notes:
${AGENTS_MD}

Guidelines:
- Prefer using tools over guessing. Inspect files before editing them.
- Keep shell commands non-interactive; never start a pager or editor.
- When a task needs several actions, plan first with the todo list, then
  work through it step by step.
- Report results concisely. Do not repeat large file contents the user
  already saw.
"#;

/// Instruction appended to the synthetic message that feeds a compaction
/// call.
pub const COMPACT: &str = r#"Compact the conversation above into a dense context for continuing the work. Keep:
1. The user's goals and constraints, exactly as stated.
2. Decisions made so far and their reasons.
3. File paths, commands, code fragments and other hard facts that later steps will need.
4. What remains to be done.
Write plain prose. Do not address the user; this text replaces the old conversation."#;

/// Lead-in of the synthetic user message that replaces compacted history.
pub const COMPACTED_PREFIX: &str = "Previous context has been compacted. Here is the compaction output:";

/// Sent to a sub-agent whose final response was too brief to be useful.
pub const CONTINUE_PROMPT: &str = r#"Your previous response was too brief. Please provide a more comprehensive summary that includes:

1. Specific technical details and implementations
2. Complete code examples if relevant
3. Detailed findings and analysis
4. All important information that should be aware of by the caller"#;

/// Description of the Task tool; `${SUBAGENTS_MD}` lists the fixed
/// sub-agents available at load time.
pub const TASK_DESCRIPTION: &str = r#"Delegate a task to a specialized subagent. The subagent works in its own context and returns a single final report; it cannot see your conversation, so the prompt must contain all necessary background information.

Available subagents:
${SUBAGENTS_MD}

Subagents created with CreateSubagent during this session can also be named here."#;

pub const CREATE_SUBAGENT_DESCRIPTION: &str = r#"Create a new dynamic subagent with a custom system prompt. The subagent shares your tools and becomes available to the Task tool on your next step. Use this to set up focused workers (e.g. a reviewer, a summarizer) before delegating."#;

pub const SEND_DMAIL_DESCRIPTION: &str = r#"Send a message back to a previous checkpoint of this conversation. After the current step completes, the conversation is rewound to the checkpoint and your message arrives there as the next user input. Only one D-Mail can be pending at a time, and the filesystem is NOT rolled back - only the conversation."#;

/// Replace `${NAME}` placeholders.  Unknown placeholders are left intact.
pub fn substitute(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("${{{key}}}"), value);
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
