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
    old_str: String,
    new_str: String,
}

pub struct StrReplaceFileTool {
    work_dir: PathBuf,
}

impl StrReplaceFileTool {
    pub fn new(work_dir: PathBuf) -> Self {
        Self { work_dir }
    }
}

#[async_trait]
impl Tool for StrReplaceFileTool {
    fn name(&self) -> &str {
        "StrReplaceFile"
    }

    fn description(&self) -> &str {
        "Replace one exact occurrence of a string in a file. The old string \
         must appear exactly once."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path, absolute or relative to the working directory" },
                "old_str": { "type": "string", "description": "Exact text to replace" },
                "new_str": { "type": "string", "description": "Replacement text" }
            },
            "required": ["path", "old_str", "new_str"]
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
                "StrReplaceFile",
                "write_file",
                format!("edit {}", path.display()),
            )
            .await;
        if !approved {
            return ToolError::rejected(&format!("edit {}", path.display())).into();
        }

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
        let occurrences = text.matches(&params.old_str).count();
        if occurrences == 0 {
            return ToolError::generic(
                "old_str not found in the file; re-read the file and try again",
                "Text not found",
            )
            .into();
        }
        if occurrences > 1 {
            return ToolError::generic(
                format!("old_str appears {occurrences} times; provide a unique anchor"),
                "Ambiguous replacement",
            )
            .into();
        }
        let updated = text.replacen(&params.old_str, &params.new_str, 1);
        match tokio::fs::write(&path, updated).await {
            Ok(()) => ToolOk::new("")
                .with_message(format!("Edited {}.", path.display()))
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
            tool_call: ToolCall::new("c1", "StrReplaceFile", "{}"),
            approval: Arc::new(Approval::new(true)),
        }
    }

    #[tokio::test]
    async fn replaces_unique_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "one two three").unwrap();
        let t = StrReplaceFileTool::new(dir.path().to_path_buf());
        let ret = t
            .call(
                &ctx(),
                json!({"path": "f.txt", "old_str": "two", "new_str": "2"}),
            )
            .await;
        assert!(!ret.is_error());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "one 2 three"
        );
    }

    #[tokio::test]
    async fn ambiguous_anchor_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "dup dup").unwrap();
        let t = StrReplaceFileTool::new(dir.path().to_path_buf());
        let ret = t
            .call(
                &ctx(),
                json!({"path": "f.txt", "old_str": "dup", "new_str": "x"}),
            )
            .await;
        assert!(ret.is_error());
    }

    #[tokio::test]
    async fn missing_anchor_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "abc").unwrap();
        let t = StrReplaceFileTool::new(dir.path().to_path_buf());
        let ret = t
            .call(
                &ctx(),
                json!({"path": "f.txt", "old_str": "zzz", "new_str": "x"}),
            )
            .await;
        assert!(ret.is_error());
    }
}
