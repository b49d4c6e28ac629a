// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

use yurei_model::{ToolCall, ToolSchema};

use crate::approval::Approval;
use crate::tool::{Tool, ToolContext, ToolError, ToolResult};

/// The outcome of `handle`: decode and lookup failures resolve
/// immediately, everything else runs as its own task.
pub enum HandleResult {
    Ready(ToolResult),
    Pending(JoinHandle<ToolResult>),
}

/// Insertion-ordered tool registry.  `handle` may be called concurrently;
/// each invocation gets its own [`ToolContext`].
pub struct Toolset {
    approval: Arc<Approval>,
    tools: RwLock<Vec<Arc<dyn Tool>>>,
}

impl Toolset {
    pub fn new(approval: Arc<Approval>) -> Self {
        Self {
            approval,
            tools: RwLock::new(Vec::new()),
        }
    }

    /// Register a tool, replacing any previous tool of the same name while
    /// keeping its position.
    pub fn add(&self, tool: Arc<dyn Tool>) {
        let mut tools = self.tools.write().expect("toolset poisoned");
        match tools.iter().position(|t| t.name() == tool.name()) {
            Some(i) => tools[i] = tool,
            None => tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .expect("toolset poisoned")
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools
            .read()
            .expect("toolset poisoned")
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Schemas in registration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .read()
            .expect("toolset poisoned")
            .iter()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect()
    }

    /// Dispatch one tool call.
    ///
    /// 1. unknown name resolves to `NotFound`
    /// 2. undecodable arguments resolve to `ParseError` (null/empty decode
    ///    to the empty object)
    /// 3. arguments whose shape contradicts the declared schema resolve to
    ///    `ValidateError`
    /// 4. otherwise the tool runs on its own task
    pub fn handle(&self, tool_call: &ToolCall) -> HandleResult {
        let name = &tool_call.function.name;
        let Some(tool) = self.get(name) else {
            return HandleResult::Ready(ToolResult {
                tool_call_id: tool_call.id.clone(),
                return_value: ToolError::not_found(name).into(),
            });
        };

        let raw = tool_call.function.arguments.trim();
        let args: Value = if raw.is_empty() || raw == "null" {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str(raw) {
                Ok(v) => v,
                Err(e) => {
                    return HandleResult::Ready(ToolResult {
                        tool_call_id: tool_call.id.clone(),
                        return_value: ToolError::parse(e.to_string()).into(),
                    })
                }
            }
        };

        if let Some(err) = shallow_validate(&tool.parameters(), &args) {
            return HandleResult::Ready(ToolResult {
                tool_call_id: tool_call.id.clone(),
                return_value: err.into(),
            });
        }

        debug!(tool = %name, tool_call_id = %tool_call.id, "dispatching tool call");
        let ctx = ToolContext {
            tool_call: tool_call.clone(),
            approval: self.approval.clone(),
        };
        let tool_call_id = tool_call.id.clone();
        HandleResult::Pending(tokio::spawn(async move {
            let value = tool.call(&ctx, args).await;
            ToolResult {
                tool_call_id,
                return_value: value,
            }
        }))
    }
}

/// Check the decoded arguments against the schema's top-level `type`.
/// Deep validation is each tool's own `parse_params` call.
fn shallow_validate(schema: &Value, args: &Value) -> Option<ToolError> {
    let expected = schema.get("type").and_then(|t| t.as_str())?;
    let ok = match expected {
        "object" => args.is_object(),
        "array" => args.is_array(),
        "string" => args.is_string(),
        "number" | "integer" => args.is_number(),
        "boolean" => args.is_boolean(),
        _ => true,
    };
    if ok {
        None
    } else {
        Some(ToolError::validate(format!(
            "expected arguments of type `{expected}`, got: {args}"
        )))
    }
}

/// Await a handle result, mapping panics to `RuntimeError`.
pub async fn await_handle_result(result: HandleResult, tool_call_id: &str) -> ToolResult {
    match result {
        HandleResult::Ready(r) => r,
        HandleResult::Pending(handle) => match handle.await {
            Ok(r) => r,
            Err(e) => ToolResult {
                tool_call_id: tool_call_id.to_string(),
                return_value: ToolError::runtime(format!("tool task failed: {e}")).into(),
            },
        },
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{ToolErrorKind, ToolOk, ToolReturnValue};
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its arguments"
        }
        fn parameters(&self) -> Value {
            json!({ "type": "object", "properties": { "text": { "type": "string" } } })
        }
        async fn call(&self, _ctx: &ToolContext, args: Value) -> ToolReturnValue {
            ToolOk::new(args.to_string()).into()
        }
    }

    fn toolset() -> Toolset {
        let ts = Toolset::new(Arc::new(Approval::new(true)));
        ts.add(Arc::new(EchoTool));
        ts
    }

    #[tokio::test]
    async fn known_tool_runs_and_resolves() {
        let ts = toolset();
        let call = ToolCall::new("c1", "echo", "{\"text\":\"hi\"}");
        let result = await_handle_result(ts.handle(&call), &call.id).await;
        assert_eq!(result.tool_call_id, "c1");
        match result.return_value {
            ToolReturnValue::Ok(ok) => assert_eq!(ok.output, "{\"text\":\"hi\"}".into()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let ts = toolset();
        let call = ToolCall::new("c1", "missing", "{}");
        let result = await_handle_result(ts.handle(&call), &call.id).await;
        match result.return_value {
            ToolReturnValue::Error(e) => assert_eq!(e.kind, ToolErrorKind::NotFound),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_json_is_a_parse_error() {
        let ts = toolset();
        let call = ToolCall::new("c1", "echo", "{not json");
        let result = await_handle_result(ts.handle(&call), &call.id).await;
        match result.return_value {
            ToolReturnValue::Error(e) => assert_eq!(e.kind, ToolErrorKind::ParseError),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_arguments_decode_to_empty_object() {
        let ts = toolset();
        for raw in ["", "null"] {
            let call = ToolCall::new("c1", "echo", raw);
            let result = await_handle_result(ts.handle(&call), &call.id).await;
            match result.return_value {
                ToolReturnValue::Ok(ok) => assert_eq!(ok.output, "{}".into()),
                other => panic!("unexpected for {raw:?}: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn wrong_shape_is_a_validate_error() {
        let ts = toolset();
        let call = ToolCall::new("c1", "echo", "[1,2,3]");
        let result = await_handle_result(ts.handle(&call), &call.id).await;
        match result.return_value {
            ToolReturnValue::Error(e) => assert_eq!(e.kind, ToolErrorKind::ValidateError),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_handles_are_independent() {
        let ts = Arc::new(toolset());
        let mut handles = Vec::new();
        for i in 0..8 {
            let call = ToolCall::new(format!("c{i}"), "echo", format!("{{\"text\":\"{i}\"}}"));
            handles.push((call.id.clone(), ts.handle(&call)));
        }
        for (id, h) in handles {
            let result = await_handle_result(h, &id).await;
            assert_eq!(result.tool_call_id, id);
            assert!(!result.return_value.is_error());
        }
    }

    #[test]
    fn schemas_preserve_insertion_order() {
        struct Named(&'static str);
        #[async_trait]
        impl Tool for Named {
            fn name(&self) -> &str {
                self.0
            }
            fn description(&self) -> &str {
                "x"
            }
            fn parameters(&self) -> Value {
                json!({ "type": "object" })
            }
            async fn call(&self, _ctx: &ToolContext, _args: Value) -> ToolReturnValue {
                ToolOk::new("").into()
            }
        }
        let ts = Toolset::new(Arc::new(Approval::new(true)));
        ts.add(Arc::new(Named("zeta")));
        ts.add(Arc::new(Named("alpha")));
        ts.add(Arc::new(Named("mid")));
        let names: Vec<String> = ts.schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }
}
