// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::tool::{parse_params, Tool, ToolContext, ToolOk, ToolReturnValue};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    pub status: TodoStatus,
}

#[derive(Deserialize)]
struct Params {
    todos: Vec<TodoItem>,
}

/// Replaces the task list wholesale on each call; the current list is
/// echoed back so the model always sees the authoritative state.
#[derive(Default)]
pub struct SetTodoListTool {
    todos: Mutex<Vec<TodoItem>>,
}

impl SetTodoListTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Vec<TodoItem> {
        self.todos.lock().expect("todo list poisoned").clone()
    }
}

#[async_trait]
impl Tool for SetTodoListTool {
    fn name(&self) -> &str {
        "SetTodoList"
    }

    fn description(&self) -> &str {
        "Replace the whole task list. Use to plan multi-step work and track \
         progress; statuses are pending, in_progress, done."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": { "type": "string" },
                            "status": { "type": "string", "enum": ["pending", "in_progress", "done"] }
                        },
                        "required": ["content", "status"]
                    }
                }
            },
            "required": ["todos"]
        })
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> ToolReturnValue {
        let params: Params = match parse_params(args) {
            Ok(p) => p,
            Err(e) => return e.into(),
        };
        let rendered = params
            .todos
            .iter()
            .map(|t| {
                let mark = match t.status {
                    TodoStatus::Pending => " ",
                    TodoStatus::InProgress => ">",
                    TodoStatus::Done => "x",
                };
                format!("[{mark}] {}", t.content)
            })
            .collect::<Vec<_>>()
            .join("\n");
        *self.todos.lock().expect("todo list poisoned") = params.todos;
        ToolOk::new(rendered)
            .with_message("Todo list updated.")
            .into()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
