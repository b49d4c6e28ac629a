// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The approval broker.
//!
//! Side-effecting tools call [`Approval::request`] before acting; the soul
//! drains the queue with [`Approval::fetch_request`] and publishes each
//! request to the front-end, which answers through
//! [`Approval::resolve_request`].  Yolo mode and the session auto-approve
//! set short-circuit the round trip.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::tool::ToolContext;

/// An outstanding approval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: String,
    pub tool_call_id: String,
    pub sender: String,
    /// Identifies the action for session-wide auto-approval.
    pub action: String,
    /// Human-facing description of what will happen.
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalResponse {
    Approve,
    ApproveForSession,
    Reject,
}

#[derive(Debug, Error)]
#[error("no pending approval request with ID {0}")]
pub struct UnknownRequest(pub String);

pub struct Approval {
    yolo: AtomicBool,
    auto_approve_actions: Mutex<HashSet<String>>,
    queue_tx: mpsc::UnboundedSender<Request>,
    queue_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Request>>,
    pending: Mutex<HashMap<String, (Request, oneshot::Sender<bool>)>>,
}

impl Approval {
    pub fn new(yolo: bool) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            yolo: AtomicBool::new(yolo),
            auto_approve_actions: Mutex::new(HashSet::new()),
            queue_tx,
            queue_rx: tokio::sync::Mutex::new(queue_rx),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_yolo(&self, yolo: bool) {
        self.yolo.store(yolo, Ordering::Relaxed);
    }

    /// Request approval for `action`.  Called by tools, with their call
    /// context proving a tool call is in flight.  Resolves immediately in
    /// yolo mode or when the action is auto-approved for the session;
    /// otherwise blocks until the front-end answers.  A dropped broker
    /// resolves to `false`.
    pub async fn request(
        &self,
        ctx: &ToolContext,
        sender: impl Into<String>,
        action: impl Into<String>,
        description: impl Into<String>,
    ) -> bool {
        let action = action.into();
        let description = description.into();
        let sender = sender.into();
        debug!(
            tool = %ctx.tool_name(),
            tool_call_id = %ctx.tool_call_id(),
            action = %action,
            "requesting approval"
        );

        if self.yolo.load(Ordering::Relaxed) {
            return true;
        }
        if self
            .auto_approve_actions
            .lock()
            .expect("auto-approve set poisoned")
            .contains(&action)
        {
            return true;
        }

        let request = Request {
            id: uuid::Uuid::new_v4().to_string(),
            tool_call_id: ctx.tool_call_id().to_string(),
            sender,
            action,
            description,
        };
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending map poisoned")
            .insert(request.id.clone(), (request.clone(), tx));
        if self.queue_tx.send(request).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Pull the next request for the front-end.  Requests whose action
    /// joined the auto-approve set while queued are resolved on the spot
    /// and skipped.  Returns `None` when the broker is shut down.
    pub async fn fetch_request(&self) -> Option<Request> {
        let mut rx = self.queue_rx.lock().await;
        loop {
            let request = rx.recv().await?;
            let auto = self
                .auto_approve_actions
                .lock()
                .expect("auto-approve set poisoned")
                .contains(&request.action);
            if auto {
                debug!(action = %request.action, "auto-approving previously queued action");
                let _ = self.resolve_request(&request.id, ApprovalResponse::Approve);
                continue;
            }
            return Some(request);
        }
    }

    /// Resolve an outstanding request.  `ApproveForSession` registers the
    /// action for the rest of the session.  Resolution of a request whose
    /// tool call was cancelled is a silent no-op on the tool side.
    pub fn resolve_request(
        &self,
        request_id: &str,
        response: ApprovalResponse,
    ) -> Result<(), UnknownRequest> {
        let (request, tx) = self
            .pending
            .lock()
            .expect("pending map poisoned")
            .remove(request_id)
            .ok_or_else(|| UnknownRequest(request_id.to_string()))?;
        debug!(request_id = %request_id, response = ?response, "resolving approval request");
        let approved = match response {
            ApprovalResponse::Approve => true,
            ApprovalResponse::ApproveForSession => {
                self.auto_approve_actions
                    .lock()
                    .expect("auto-approve set poisoned")
                    .insert(request.action.clone());
                true
            }
            ApprovalResponse::Reject => false,
        };
        // the receiver is gone when the tool call was cancelled
        let _ = tx.send(approved);
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use yurei_model::ToolCall;

    fn ctx(approval: &Arc<Approval>) -> ToolContext {
        ToolContext {
            tool_call: ToolCall::new("c1", "Shell", "{}"),
            approval: approval.clone(),
        }
    }

    #[tokio::test]
    async fn yolo_approves_without_queueing() {
        let approval = Arc::new(Approval::new(true));
        assert!(approval.request(&ctx(&approval), "Shell", "ls", "ls").await);
    }

    #[tokio::test]
    async fn approve_resolves_true() {
        let approval = Arc::new(Approval::new(false));
        let a2 = approval.clone();
        let c = ctx(&approval);
        let requester =
            tokio::spawn(async move { a2.request(&c, "Shell", "rm", "rm -rf /tmp/x").await });
        let req = approval.fetch_request().await.unwrap();
        assert_eq!(req.action, "rm");
        assert_eq!(req.tool_call_id, "c1");
        approval
            .resolve_request(&req.id, ApprovalResponse::Approve)
            .unwrap();
        assert!(requester.await.unwrap());
    }

    #[tokio::test]
    async fn reject_resolves_false() {
        let approval = Arc::new(Approval::new(false));
        let a2 = approval.clone();
        let c = ctx(&approval);
        let requester = tokio::spawn(async move { a2.request(&c, "Shell", "rm", "rm").await });
        let req = approval.fetch_request().await.unwrap();
        approval
            .resolve_request(&req.id, ApprovalResponse::Reject)
            .unwrap();
        assert!(!requester.await.unwrap());
    }

    #[tokio::test]
    async fn approve_for_session_skips_future_requests() {
        let approval = Arc::new(Approval::new(false));
        let a2 = approval.clone();
        let c = ctx(&approval);
        let requester = tokio::spawn(async move { a2.request(&c, "Shell", "git", "git push").await });
        let req = approval.fetch_request().await.unwrap();
        approval
            .resolve_request(&req.id, ApprovalResponse::ApproveForSession)
            .unwrap();
        assert!(requester.await.unwrap());

        // second request for the same action never reaches the queue
        assert!(approval.request(&ctx(&approval), "Shell", "git", "git pull").await);
    }

    #[tokio::test]
    async fn queued_request_is_retroactively_auto_approved() {
        let approval = Arc::new(Approval::new(false));
        let a2 = approval.clone();
        let c = ctx(&approval);
        let requester = tokio::spawn(async move { a2.request(&c, "Shell", "git", "git push").await });
        // let the request land in the queue first
        tokio::task::yield_now().await;
        approval
            .auto_approve_actions
            .lock()
            .unwrap()
            .insert("git".into());
        // the drain sees the now-auto-approved action and resolves it
        let a3 = approval.clone();
        let fetcher = tokio::spawn(async move { a3.fetch_request().await });
        assert!(requester.await.unwrap());
        fetcher.abort();
    }

    #[tokio::test]
    async fn resolving_unknown_request_errors() {
        let approval = Approval::new(false);
        assert!(approval
            .resolve_request("nope", ApprovalResponse::Approve)
            .is_err());
    }
}
