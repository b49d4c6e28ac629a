// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tool::{parse_params, Tool, ToolContext, ToolOk, ToolReturnValue};

#[derive(Deserialize)]
struct Params {
    #[allow(dead_code)]
    thought: String,
}

/// A scratchpad: lets the model record intermediate reasoning as an
/// explicit step without any side effect.
pub struct ThinkTool;

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &str {
        "Think"
    }

    fn description(&self) -> &str {
        "Record a thought. Use when reasoning through a complex problem; \
         has no side effects."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "thought": { "type": "string", "description": "The thought to record" }
            },
            "required": ["thought"]
        })
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> ToolReturnValue {
        match parse_params::<Params>(args) {
            Ok(_) => ToolOk::new("")
                .with_message("Thought recorded.")
                .into(),
            Err(e) => e.into(),
        }
    }
}
