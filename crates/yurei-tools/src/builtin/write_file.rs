// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tool::{parse_params, Tool, ToolContext, ToolError, ToolOk, ToolReturnValue};

#[derive(Deserialize)]
struct Params {
    path: String,
    content: String,
}

pub struct WriteFileTool {
    work_dir: PathBuf,
}

impl WriteFileTool {
    pub fn new(work_dir: PathBuf) -> Self {
        Self { work_dir }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "WriteFile"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed. \
         Overwrites any existing content."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path, absolute or relative to the working directory" },
                "content": { "type": "string", "description": "Full new file content" }
            },
            "required": ["path", "content"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolReturnValue {
        let params: Params = match parse_params(args) {
            Ok(p) => p,
            Err(e) => return e.into(),
        };
        let path = {
            let p = PathBuf::from(&params.path);
            if p.is_absolute() {
                p
            } else {
                self.work_dir.join(p)
            }
        };

        let approved = ctx
            .approval
            .request(
                ctx,
                "WriteFile",
                "write_file",
                format!("write {} bytes to {}", params.content.len(), path.display()),
            )
            .await;
        if !approved {
            return ToolError::rejected(&format!("write to {}", path.display())).into();
        }

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolError::generic(
                    format!("cannot create {}: {e}", parent.display()),
                    "Cannot create directory",
                )
                .into();
            }
        }
        match tokio::fs::write(&path, &params.content).await {
            Ok(()) => ToolOk::new("")
                .with_message(format!(
                    "Wrote {} bytes to {}.",
                    params.content.len(),
                    path.display()
                ))
                .into(),
            Err(e) => ToolError::generic(
                format!("cannot write {}: {e}", path.display()),
                "Cannot write file",
            )
            .into(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::Approval;
    use std::sync::Arc;
    use yurei_model::ToolCall;

    fn ctx() -> ToolContext {
        ToolContext {
            tool_call: ToolCall::new("c1", "WriteFile", "{}"),
            approval: Arc::new(Approval::new(true)),
        }
    }

    #[tokio::test]
    async fn writes_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let t = WriteFileTool::new(dir.path().to_path_buf());
        let ret = t
            .call(&ctx(), json!({"path": "sub/dir/f.txt", "content": "hello"}))
            .await;
        assert!(!ret.is_error());
        let written = std::fs::read_to_string(dir.path().join("sub/dir/f.txt")).unwrap();
        assert_eq!(written, "hello");
    }
}
