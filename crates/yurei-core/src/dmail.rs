// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Time-travel control: a single-slot holder for a pending revert request.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use yurei_tools::{parse_params, Tool, ToolContext, ToolError, ToolOk, ToolReturnValue};

use crate::prompts;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DMail {
    /// The message delivered as user input after the revert.
    pub message: String,
    /// The checkpoint to rewind to.
    pub checkpoint_id: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DenwaRenjiError {
    #[error("only one D-Mail can be sent at a time")]
    SlotOccupied,
    #[error("there is no checkpoint with the given ID")]
    NoSuchCheckpoint,
}

/// Holds at most one pending d-mail.  The SendDMail tool fills the slot;
/// the soul polls it after each step.
#[derive(Default)]
pub struct DenwaRenji {
    pending: Mutex<Option<DMail>>,
    n_checkpoints: AtomicU32,
}

impl DenwaRenji {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send_dmail(&self, dmail: DMail) -> Result<(), DenwaRenjiError> {
        if dmail.checkpoint_id >= self.n_checkpoints.load(Ordering::Acquire) {
            return Err(DenwaRenjiError::NoSuchCheckpoint);
        }
        let mut pending = self.pending.lock().expect("d-mail slot poisoned");
        if pending.is_some() {
            return Err(DenwaRenjiError::SlotOccupied);
        }
        *pending = Some(dmail);
        Ok(())
    }

    /// Keep the slot's validity window in sync with the context.
    pub fn set_n_checkpoints(&self, n: u32) {
        self.n_checkpoints.store(n, Ordering::Release);
    }

    /// Take the pending d-mail, leaving the slot empty.
    pub fn fetch_pending_dmail(&self) -> Option<DMail> {
        self.pending.lock().expect("d-mail slot poisoned").take()
    }
}

pub struct SendDMailTool {
    denwa_renji: Arc<DenwaRenji>,
}

impl SendDMailTool {
    pub fn new(denwa_renji: Arc<DenwaRenji>) -> Self {
        Self { denwa_renji }
    }
}

#[async_trait]
impl Tool for SendDMailTool {
    fn name(&self) -> &str {
        "SendDMail"
    }

    fn description(&self) -> &str {
        prompts::SEND_DMAIL_DESCRIPTION
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": { "type": "string", "description": "The message to send" },
                "checkpoint_id": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "The checkpoint to send the message back to"
                }
            },
            "required": ["message", "checkpoint_id"]
        })
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> ToolReturnValue {
        let dmail: DMail = match parse_params(args) {
            Ok(d) => d,
            Err(e) => return e.into(),
        };
        match self.denwa_renji.send_dmail(dmail) {
            Ok(()) => ToolOk::new("")
                // when the d-mail takes effect the revert erases this
                // result, so the model only ever reads it on failure
                .with_message(
                    "If you see this message, the D-Mail was NOT sent successfully. \
                     This may be because some other tool that needs approval was rejected.",
                )
                .with_brief("D-Mail queued")
                .into(),
            Err(e) => ToolError::generic(format!("Failed to send D-Mail. Error: {e}"), "Failed to send D-Mail")
                .into(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_holds_at_most_one() {
        let dr = DenwaRenji::new();
        dr.set_n_checkpoints(3);
        dr.send_dmail(DMail {
            message: "first".into(),
            checkpoint_id: 1,
        })
        .unwrap();
        let err = dr
            .send_dmail(DMail {
                message: "second".into(),
                checkpoint_id: 0,
            })
            .unwrap_err();
        assert_eq!(err, DenwaRenjiError::SlotOccupied);
    }

    #[test]
    fn checkpoint_bounds_are_validated() {
        let dr = DenwaRenji::new();
        dr.set_n_checkpoints(2);
        assert_eq!(
            dr.send_dmail(DMail {
                message: "x".into(),
                checkpoint_id: 2,
            }),
            Err(DenwaRenjiError::NoSuchCheckpoint)
        );
        assert!(dr
            .send_dmail(DMail {
                message: "x".into(),
                checkpoint_id: 1,
            })
            .is_ok());
    }

    #[test]
    fn fetch_empties_the_slot() {
        let dr = DenwaRenji::new();
        dr.set_n_checkpoints(1);
        dr.send_dmail(DMail {
            message: "go".into(),
            checkpoint_id: 0,
        })
        .unwrap();
        let fetched = dr.fetch_pending_dmail().unwrap();
        assert_eq!(fetched.message, "go");
        assert!(dr.fetch_pending_dmail().is_none());
        // slot is free again
        assert!(dr
            .send_dmail(DMail {
                message: "again".into(),
                checkpoint_id: 0,
            })
            .is_ok());
    }

    #[tokio::test]
    async fn tool_reports_slot_errors() {
        use yurei_tools::Approval;
        let dr = Arc::new(DenwaRenji::new());
        dr.set_n_checkpoints(1);
        let tool = SendDMailTool::new(dr.clone());
        let ctx = ToolContext {
            tool_call: yurei_model::ToolCall::new("c1", "SendDMail", "{}"),
            approval: Arc::new(Approval::new(true)),
        };
        let ok = tool
            .call(&ctx, json!({"message": "m", "checkpoint_id": 0}))
            .await;
        assert!(!ok.is_error());
        let err = tool
            .call(&ctx, json!({"message": "m", "checkpoint_id": 0}))
            .await;
        assert!(err.is_error());
    }
}
