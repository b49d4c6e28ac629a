// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The soul contract and the run harness connecting a soul to its UI loop.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use yurei_model::ChatError;

use crate::wire::{UserInput, Wire};

/// Immutable status snapshot of a soul.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSnapshot {
    /// Fraction of the context window in use; 0.0 when unknown.
    pub context_usage: f64,
}

#[derive(Debug, Error)]
pub enum SoulError {
    #[error("LLM not set")]
    LlmNotSet,
    #[error("LLM model '{model}' does not support required capabilities: {}", capabilities.join(", "))]
    LlmNotSupported {
        model: String,
        capabilities: Vec<String>,
    },
    #[error("max number of steps reached: {0}")]
    MaxStepsReached(u32),
    #[error("the run was cancelled")]
    RunCancelled,
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A cancellation signal: fires when the sender half sends or is dropped.
pub type CancelSignal = oneshot::Receiver<()>;

#[async_trait]
pub trait Soul: Send {
    fn name(&self) -> &str;

    /// Model name; empty when no LLM is configured.
    fn model_name(&self) -> String;

    fn status(&self) -> StatusSnapshot;

    /// Run one turn.  Emits every event onto `wire` and aborts
    /// cooperatively when `cancel` fires.
    async fn run(
        &mut self,
        user_input: UserInput,
        wire: Arc<Wire>,
        cancel: &mut CancelSignal,
    ) -> Result<(), SoulError>;
}

/// Run one turn of `soul`, wiring it to a UI loop.
///
/// The wire is created here (with an optional recorder), the UI loop is
/// spawned against it, and the soul drives the turn.  Whatever the
/// outcome, the wire is shut down so the UI loop terminates; a stuck UI
/// loop is abandoned after a grace period.
pub async fn run_soul<S, F, Fut>(
    soul: &mut S,
    user_input: UserInput,
    ui_loop: F,
    mut cancel: CancelSignal,
    wire_file_backend: Option<PathBuf>,
) -> Result<(), SoulError>
where
    S: Soul,
    F: FnOnce(Arc<Wire>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let wire = Arc::new(Wire::new());
    if let Some(path) = wire_file_backend {
        wire.start_recorder(path);
    }

    debug!("starting UI loop");
    let ui_task = tokio::spawn(ui_loop(wire.clone()));

    debug!("starting soul run");
    let result = soul.run(user_input, wire.clone(), &mut cancel).await;

    debug!("shutting down the UI loop");
    wire.shutdown();
    match tokio::time::timeout(Duration::from_millis(500), ui_task).await {
        Ok(Ok(())) => debug!("UI loop shut down"),
        Ok(Err(e)) => warn!(error = %e, "UI loop task failed"),
        Err(_) => warn!("UI loop timed out"),
    }

    result
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
