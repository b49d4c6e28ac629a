// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Sub-agent orchestration: the Task tool spawns a nested soul over its
//! own context file, forwarding its wire into the parent's.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use yurei_model::Role;
use yurei_tools::{parse_params, Tool, ToolContext, ToolError, ToolOk, ToolReturnValue, Toolset};

use crate::agent::{Agent, Runtime};
use crate::context::Context;
use crate::paths::next_available_rotation;
use crate::prompts;
use crate::soul::{run_soul, SoulError};
use crate::wire::{SubagentEvent, Wire, WireMessage};
use crate::yurei_soul::YureiSoul;

/// Final responses shorter than this trigger one expansion retry.
const MIN_FINAL_RESPONSE_CHARS: usize = 200;

#[derive(Deserialize)]
struct TaskParams {
    #[allow(dead_code)]
    description: String,
    subagent_name: String,
    prompt: String,
}

pub struct TaskTool {
    runtime: Arc<Runtime>,
    description: String,
}

impl TaskTool {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        let listing = runtime
            .labor_market
            .fixed_descriptions()
            .into_iter()
            .map(|(name, desc)| format!("- `{name}`: {desc}"))
            .collect::<Vec<_>>()
            .join("\n");
        let description = prompts::substitute(
            prompts::TASK_DESCRIPTION,
            &HashMap::from([("SUBAGENTS_MD".to_string(), listing)]),
        );
        Self {
            runtime,
            description,
        }
    }

    /// A fresh context file for a nested run: a rotated sibling of the
    /// parent session's file.
    fn subagent_context_file(&self) -> anyhow::Result<std::path::PathBuf> {
        let main = &self.runtime.session.context_file;
        let stem = main
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("context");
        let ext = main.extension().and_then(|e| e.to_str()).unwrap_or("jsonl");
        let base = main.with_file_name(format!("{stem}_sub.{ext}"));
        if let Some(parent) = base.parent() {
            std::fs::create_dir_all(parent)?;
        }
        next_available_rotation(&base)
    }

    async fn run_subagent(
        &self,
        agent: Arc<Agent>,
        prompt: &str,
        task_tool_call_id: &str,
    ) -> ToolReturnValue {
        let Some(parent_wire) = self.runtime.wire_slot.get() else {
            return ToolError::runtime("no wire available for subagent forwarding").into();
        };

        let context_file = match self.subagent_context_file() {
            Ok(p) => p,
            Err(e) => {
                return ToolError::runtime(format!("cannot allocate subagent context: {e}")).into()
            }
        };
        debug!(
            subagent = %agent.name,
            context_file = %context_file.display(),
            "spawning subagent"
        );
        let mut soul = YureiSoul::new((*agent).clone(), Context::new(context_file));

        for attempt in 0..2 {
            let input = if attempt == 0 {
                prompt.to_string()
            } else {
                prompts::CONTINUE_PROMPT.to_string()
            };
            // the sender is held for the whole nested run so the child is
            // never spuriously cancelled
            let (_cancel_tx, cancel_rx) = oneshot::channel::<()>();
            let ui_loop = forwarding_ui_loop(parent_wire.clone(), task_tool_call_id.to_string());
            match run_soul(&mut soul, input.as_str().into(), ui_loop, cancel_rx, None).await {
                Ok(()) => {}
                Err(SoulError::MaxStepsReached(n)) => {
                    return ToolError::generic(
                        format!(
                            "Max steps {n} reached when running subagent. \
                             Please try splitting the task into smaller subtasks."
                        ),
                        "Max steps reached",
                    )
                    .into();
                }
                Err(e) => {
                    warn!(error = %e, "subagent run failed");
                    return ToolError::generic(
                        format!("Failed to run subagent: {e}"),
                        "Failed to run subagent",
                    )
                    .into();
                }
            }

            let final_response = soul
                .context()
                .history()
                .last()
                .filter(|m| m.role == Role::Assistant)
                .map(|m| m.extract_text("\n"));
            match final_response {
                None => {
                    return ToolError::generic(
                        "The subagent seemed not to run properly. \
                         Maybe you have to do the task yourself.",
                        "Failed to run subagent",
                    )
                    .into();
                }
                Some(text) if text.len() < MIN_FINAL_RESPONSE_CHARS && attempt == 0 => {
                    debug!(len = text.len(), "subagent response too brief, asking to expand");
                    continue;
                }
                Some(text) => return ToolOk::new(text).into(),
            }
        }
        unreachable!("second attempt always returns")
    }
}

/// Forward every nested wire event to the parent wrapped in a
/// `SubagentEvent` — except approval traffic, which the front-end must
/// drive globally and therefore stays top-level.
fn forwarding_ui_loop(
    parent_wire: Arc<Wire>,
    task_tool_call_id: String,
) -> impl FnOnce(Arc<Wire>) -> futures::future::BoxFuture<'static, ()> {
    move |wire: Arc<Wire>| {
        Box::pin(async move {
            let mut ui = wire.ui_side(true);
            while let Ok(msg) = ui.receive().await {
                match msg {
                    WireMessage::ApprovalRequest(_) | WireMessage::ApprovalRequestResolved(_) => {
                        parent_wire.send(msg);
                    }
                    other => {
                        parent_wire.send(WireMessage::SubagentEvent(SubagentEvent {
                            task_tool_call_id: task_tool_call_id.clone(),
                            event: Box::new(other),
                        }));
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "Task"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "A short (3-5 word) description of the task"
                },
                "subagent_name": {
                    "type": "string",
                    "description": "The name of the specialized subagent to use for this task"
                },
                "prompt": {
                    "type": "string",
                    "description": "The task for the subagent to perform. You must provide a detailed prompt with all necessary background information because the subagent cannot see anything in your context."
                }
            },
            "required": ["description", "subagent_name", "prompt"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolReturnValue {
        let params: TaskParams = match parse_params(args) {
            Ok(p) => p,
            Err(e) => return e.into(),
        };
        let Some(agent) = self.runtime.labor_market.get(&params.subagent_name) else {
            return ToolError::generic(
                format!("Subagent not found: {}", params.subagent_name),
                "Subagent not found",
            )
            .into();
        };
        self.run_subagent(agent, &params.prompt, ctx.tool_call_id())
            .await
    }
}

#[derive(Deserialize)]
struct CreateParams {
    name: String,
    system_prompt: String,
}

/// Registers a dynamic sub-agent sharing the parent's toolset.  Results
/// become visible to Task dispatch from the next step.
pub struct CreateSubagentTool {
    runtime: Arc<Runtime>,
    toolset: Weak<Toolset>,
}

impl CreateSubagentTool {
    pub fn new(runtime: Arc<Runtime>, toolset: Weak<Toolset>) -> Self {
        Self { runtime, toolset }
    }
}

#[async_trait]
impl Tool for CreateSubagentTool {
    fn name(&self) -> &str {
        "CreateSubagent"
    }

    fn description(&self) -> &str {
        prompts::CREATE_SUBAGENT_DESCRIPTION
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Unique name for this agent configuration (e.g. 'summarizer', 'code_reviewer'). This name will be used to reference the agent in the Task tool."
                },
                "system_prompt": {
                    "type": "string",
                    "description": "System prompt defining the agent's role, capabilities, and boundaries."
                }
            },
            "required": ["name", "system_prompt"]
        })
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> ToolReturnValue {
        let params: CreateParams = match parse_params(args) {
            Ok(p) => p,
            Err(e) => return e.into(),
        };
        if self.runtime.labor_market.get(&params.name).is_some() {
            return ToolError::generic(
                format!("Subagent with name '{}' already exists.", params.name),
                "Subagent already exists",
            )
            .into();
        }
        let Some(toolset) = self.toolset.upgrade() else {
            return ToolError::runtime("parent toolset is gone").into();
        };
        let subagent = Agent {
            name: params.name.clone(),
            system_prompt: params.system_prompt,
            toolset,
            runtime: Arc::new(self.runtime.for_dynamic_subagent()),
        };
        self.runtime
            .labor_market
            .add_dynamic_subagent(&params.name, Arc::new(subagent));
        let names = self.runtime.labor_market.names().join(", ");
        ToolOk::new(format!("Available subagents: {names}"))
            .with_message(format!("Subagent '{}' created successfully.", params.name))
            .into()
    }
}
