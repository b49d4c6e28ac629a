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
    /// 1-based first line to include.
    offset: Option<usize>,
    /// Maximum number of lines to return.
    limit: Option<usize>,
}

pub struct ReadFileTool {
    work_dir: PathBuf,
}

impl ReadFileTool {
    pub fn new(work_dir: PathBuf) -> Self {
        Self { work_dir }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = PathBuf::from(path);
        if p.is_absolute() {
            p
        } else {
            self.work_dir.join(p)
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "ReadFile"
    }

    fn description(&self) -> &str {
        "Read a text file, optionally a line range. Returns the content with \
         1-based line numbers."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path, absolute or relative to the working directory" },
                "offset": { "type": "integer", "description": "First line to read (1-based)" },
                "limit": { "type": "integer", "description": "Maximum number of lines to read" }
            },
            "required": ["path"]
        })
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> ToolReturnValue {
        let params: Params = match parse_params(args) {
            Ok(p) => p,
            Err(e) => return e.into(),
        };
        let path = self.resolve(&params.path);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) => {
                return ToolError::generic(
                    format!("cannot read {}: {e}", path.display()),
                    "Cannot read file",
                )
                .into()
            }
        };
        let offset = params.offset.unwrap_or(1).max(1);
        let limit = params.limit.unwrap_or(usize::MAX);
        let mut numbered = String::new();
        for (i, line) in text.lines().enumerate().skip(offset - 1).take(limit) {
            numbered.push_str(&format!("{:>6}\t{line}\n", i + 1));
        }
        if numbered.is_empty() {
            return ToolOk::new("").with_message("File is empty.").into();
        }
        ToolOk::new(numbered).into()
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
            tool_call: ToolCall::new("c1", "ReadFile", "{}"),
            approval: Arc::new(Approval::new(true)),
        }
    }

    #[tokio::test]
    async fn reads_numbered_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "alpha\nbeta\n").unwrap();
        let t = ReadFileTool::new(dir.path().to_path_buf());
        match t.call(&ctx(), json!({"path": "f.txt"})).await {
            ToolReturnValue::Ok(ok) => {
                assert_eq!(ok.output, "     1\talpha\n     2\tbeta\n".into())
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn range_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "a\nb\nc\nd\n").unwrap();
        let t = ReadFileTool::new(dir.path().to_path_buf());
        match t
            .call(&ctx(), json!({"path": "f.txt", "offset": 2, "limit": 2}))
            .await
        {
            ToolReturnValue::Ok(ok) => assert_eq!(ok.output, "     2\tb\n     3\tc\n".into()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let t = ReadFileTool::new(dir.path().to_path_buf());
        assert!(t.call(&ctx(), json!({"path": "nope.txt"})).await.is_error());
    }
}
