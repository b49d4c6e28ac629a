// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The wire: an spmc channel between the soul and its front-ends.
//!
//! Two views exist over the same event stream.  The raw view replays every
//! part exactly as emitted; the merged view coalesces adjacent mergeable
//! parts before publication so renderers see complete chunks.  An optional
//! recorder persists the merged view as JSONL.

pub mod message;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::broadcast::{BroadcastQueue, QueueShutDown};
pub use message::{
    ApprovalRequestMsg, ApprovalRequestResolved, CompactionBegin, CompactionEnd, StatusUpdate,
    StepBegin, StepInterrupted, SubagentEvent, TurnBegin, UserInput, WireMessage,
    WireMessageEnvelope, WireMessageError,
};

pub struct Wire {
    raw: BroadcastQueue<WireMessage>,
    merged: BroadcastQueue<WireMessage>,
    merge_buffer: Mutex<Option<WireMessage>>,
}

impl Wire {
    pub fn new() -> Self {
        Self {
            raw: BroadcastQueue::new(),
            merged: BroadcastQueue::new(),
            merge_buffer: Mutex::new(None),
        }
    }

    /// Soul-side send.  Single producer per wire: the raw view gets the
    /// message verbatim; the merged view buffers mergeable parts and
    /// flushes on the first unmergeable message.
    pub fn send(&self, msg: WireMessage) {
        if self.raw.publish(msg.clone()).is_err() {
            debug!("raw wire queue is shut down, dropping message");
        }

        let mut buffer = self.merge_buffer.lock().expect("merge buffer poisoned");
        if msg.is_mergeable() {
            let absorbed = match &mut *buffer {
                Some(pending) => pending.merge_in_place(&msg),
                None => false,
            };
            if !absorbed {
                // the pending part is complete, it goes out first
                if let Some(complete) = buffer.replace(msg) {
                    let _ = self.merged.publish(complete);
                }
            }
        } else {
            if let Some(complete) = buffer.take() {
                let _ = self.merged.publish(complete);
            }
            if self.merged.publish(msg).is_err() {
                debug!("merged wire queue is shut down, dropping message");
            }
        }
    }

    /// Flush the pending merge buffer; called at shutdown.
    pub fn flush(&self) {
        let pending = self
            .merge_buffer
            .lock()
            .expect("merge buffer poisoned")
            .take();
        if let Some(msg) = pending {
            let _ = self.merged.publish(msg);
        }
    }

    /// Create a consumer of the wire.  `merge = true` subscribes to the
    /// coalesced view, `false` to the verbatim part stream.
    pub fn ui_side(&self, merge: bool) -> WireUiSide {
        WireUiSide {
            rx: if merge {
                self.merged.subscribe()
            } else {
                self.raw.subscribe()
            },
        }
    }

    /// Record every merged message to `file_backend` as JSONL lines of
    /// `{"timestamp": …, "message": {type, payload}}`.
    pub fn start_recorder(&self, file_backend: PathBuf) -> tokio::task::JoinHandle<()> {
        let mut rx = self.merged.subscribe();
        tokio::spawn(async move {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&file_backend)
                .await;
            let mut file = match file {
                Ok(f) => f,
                Err(e) => {
                    warn!(path = %file_backend.display(), error = %e, "cannot open wire recording");
                    return;
                }
            };
            while let Some(msg) = rx.recv().await {
                let timestamp = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);
                let record = serde_json::json!({
                    "timestamp": timestamp,
                    "message": WireMessageEnvelope::from_wire_message(&msg),
                });
                let mut line = record.to_string();
                line.push('\n');
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    warn!(error = %e, "wire recording write failed");
                    return;
                }
                let _ = file.flush().await;
            }
        })
    }

    /// Close both views.  The producer becomes a non-blocking no-op.
    pub fn shutdown(&self) {
        self.flush();
        debug!("shutting down wire");
        self.raw.shutdown();
        self.merged.shutdown();
    }
}

impl Default for Wire {
    fn default() -> Self {
        Self::new()
    }
}

pub struct WireUiSide {
    rx: tokio::sync::mpsc::UnboundedReceiver<WireMessage>,
}

impl WireUiSide {
    /// Receive the next message; errors once the wire is shut down and
    /// drained.
    pub async fn receive(&mut self) -> Result<WireMessage, QueueShutDown> {
        self.rx.recv().await.ok_or(QueueShutDown)
    }
}

/// The "current wire" slot of a runtime: set for the duration of a soul
/// run so tools spawning nested agents can reach the parent wire.
#[derive(Clone, Default)]
pub struct WireSlot(Arc<RwLock<Option<Arc<Wire>>>>);

impl WireSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<Wire>> {
        self.0.read().expect("wire slot poisoned").clone()
    }

    /// Install `wire` for the duration of the returned guard.
    pub fn set_guard(&self, wire: Arc<Wire>) -> WireSlotGuard {
        *self.0.write().expect("wire slot poisoned") = Some(wire);
        WireSlotGuard { slot: self.clone() }
    }
}

pub struct WireSlotGuard {
    slot: WireSlot,
}

impl Drop for WireSlotGuard {
    fn drop(&mut self) {
        *self.slot.0.write().expect("wire slot poisoned") = None;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
