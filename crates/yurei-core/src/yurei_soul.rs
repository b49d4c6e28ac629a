// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The step-loop soul: one turn is a sequence of steps, each an LLM call
//! plus the parallel dispatch of the tool calls it produced.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn};

use yurei_model::{
    generate, GenerateResult, Llm, Message, Role, StreamedMessagePart, ToolCall,
};
use yurei_tools::{await_handle_result, Approval, HandleResult};

use crate::agent::Agent;
use crate::compaction::SimpleCompaction;
use crate::context::Context;
use crate::message::{check_message, tool_result_to_message};
use crate::soul::{CancelSignal, Soul, SoulError, StatusSnapshot};
use crate::wire::{
    ApprovalRequestMsg, ApprovalRequestResolved, CompactionBegin, CompactionEnd, StatusUpdate,
    StepBegin, StepInterrupted, TurnBegin, UserInput, Wire, WireMessage,
};

pub struct YureiSoul {
    agent: Agent,
    context: Context,
    compaction: SimpleCompaction,
    max_steps_per_run: u32,
    max_retries_per_step: u32,
    context_usage: f64,
}

impl YureiSoul {
    pub fn new(agent: Agent, context: Context) -> Self {
        let config = agent.runtime.config.clone();
        Self {
            compaction: SimpleCompaction::new(config.compaction.preserved_messages),
            max_steps_per_run: config.loop_limits.max_steps_per_run,
            max_retries_per_step: config.loop_limits.max_retries_per_step,
            agent,
            context,
            context_usage: 0.0,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// One LLM round-trip, forwarding raw parts to the wire as they
    /// arrive.  Transient transport errors are retried with exponential
    /// backoff; cancellation preserves the partial assistant message.
    async fn generate_step(
        &mut self,
        llm: &Llm,
        wire: &Arc<Wire>,
        cancel: &mut CancelSignal,
    ) -> Result<GenerateResult, SoulError> {
        let system_prompt = self.agent.system_prompt.clone();
        let tools = self.agent.toolset.schemas();
        let history = self.context.history().to_vec();
        let provider = llm.provider.clone();

        let mut attempt: u32 = 0;
        loop {
            let accumulator = Arc::new(Mutex::new(Message::new(Role::Assistant, Vec::new())));
            let acc = accumulator.clone();
            let wire_tx = wire.clone();
            let gen = generate(
                provider.as_ref(),
                &system_prompt,
                &tools,
                &history,
                move |part| {
                    wire_tx.send(part_to_wire(part));
                    accumulate(&mut acc.lock().expect("accumulator poisoned"), part);
                },
            );
            tokio::pin!(gen);

            tokio::select! {
                biased;
                _ = &mut *cancel => {
                    let mut partial = accumulator.lock().expect("accumulator poisoned").clone();
                    partial.partial = Some(true);
                    if !partial.is_empty() {
                        self.context.append_message(&[partial]).await?;
                    }
                    wire.send(WireMessage::StepInterrupted(StepInterrupted {}));
                    return Err(SoulError::RunCancelled);
                }
                result = &mut gen => match result {
                    Ok(r) => return Ok(r),
                    Err(e) if e.is_retryable() && attempt < self.max_retries_per_step => {
                        attempt += 1;
                        let delay = Duration::from_millis(250 * (1 << attempt.min(6)));
                        warn!(attempt, error = %e, ?delay, "transient LLM error, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        wire.send(WireMessage::StepInterrupted(StepInterrupted {}));
                        return Err(e.into());
                    }
                }
            }
        }
    }

    /// Dispatch all tool calls of one step in parallel.  Results are
    /// published and appended in completion order; on cancellation the
    /// in-flight tasks are aborted and completed tools keep their
    /// messages.  Returns `true` when the step was interrupted.
    async fn dispatch_tool_calls(
        &mut self,
        wire: &Arc<Wire>,
        tool_calls: &[ToolCall],
        cancel: &mut CancelSignal,
    ) -> Result<bool, SoulError> {
        let forwarder = tokio::spawn(forward_approvals(
            self.agent.runtime.approval.clone(),
            wire.clone(),
        ));

        let mut abort_handles = Vec::new();
        let mut pending = FuturesUnordered::new();
        for tool_call in tool_calls {
            let handled = self.agent.toolset.handle(tool_call);
            if let HandleResult::Pending(handle) = &handled {
                abort_handles.push(handle.abort_handle());
            }
            let tool_call_id = tool_call.id.clone();
            pending.push(async move { await_handle_result(handled, &tool_call_id).await });
        }

        let mut interrupted = false;
        while !pending.is_empty() {
            tokio::select! {
                biased;
                _ = &mut *cancel => {
                    for handle in &abort_handles {
                        handle.abort();
                    }
                    interrupted = true;
                    break;
                }
                Some(result) = pending.next() => {
                    wire.send(WireMessage::ToolResult(result.clone()));
                    self.context
                        .append_message(&[tool_result_to_message(&result)])
                        .await?;
                }
            }
        }
        forwarder.abort();
        Ok(interrupted)
    }

    async fn compact_context(&mut self, llm: &Llm) -> Result<(), SoulError> {
        let compacted = self
            .compaction
            .compact(self.context.history(), llm)
            .await?;
        // the replacement is persisted through a rotated, re-initialised
        // store; the intermediate compaction call is never written
        self.context.clear().await?;
        self.context.append_message(&compacted).await?;
        self.agent
            .runtime
            .denwa_renji
            .set_n_checkpoints(self.context.n_checkpoints());
        Ok(())
    }
}

#[async_trait]
impl Soul for YureiSoul {
    fn name(&self) -> &str {
        &self.agent.name
    }

    fn model_name(&self) -> String {
        self.agent
            .runtime
            .llm
            .as_ref()
            .map(|llm| llm.model_name().to_string())
            .unwrap_or_default()
    }

    fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            context_usage: self.context_usage,
        }
    }

    async fn run(
        &mut self,
        user_input: UserInput,
        wire: Arc<Wire>,
        cancel: &mut CancelSignal,
    ) -> Result<(), SoulError> {
        let llm = self.agent.runtime.llm.clone().ok_or(SoulError::LlmNotSet)?;
        let _wire_guard = self.agent.runtime.wire_slot.set_guard(wire.clone());

        wire.send(WireMessage::TurnBegin(TurnBegin {
            user_input: user_input.clone(),
        }));

        let user_message = match user_input {
            UserInput::Text(text) => Message::user(text),
            UserInput::Parts(parts) => Message::new(Role::User, parts),
        };
        let missing = check_message(&user_message, &llm.capabilities);
        if !missing.is_empty() {
            let mut capabilities: Vec<String> =
                missing.iter().map(|c| c.to_string()).collect();
            capabilities.sort();
            return Err(SoulError::LlmNotSupported {
                model: llm.model_name().to_string(),
                capabilities,
            });
        }
        self.context.append_message(&[user_message]).await?;
        // seal the pre-response state
        self.context.checkpoint(false).await?;
        self.agent
            .runtime
            .denwa_renji
            .set_n_checkpoints(self.context.n_checkpoints());

        let threshold = (llm.max_context_size as f64
            * self.agent.runtime.config.compaction.threshold_fraction) as u64;

        let mut n: u32 = 1;
        loop {
            wire.send(WireMessage::StepBegin(StepBegin { n }));
            debug!(step = n, "beginning step");

            if self.context.token_count() > threshold {
                wire.send(WireMessage::CompactionBegin(CompactionBegin {}));
                self.compact_context(&llm).await?;
                wire.send(WireMessage::CompactionEnd(CompactionEnd {}));
            }

            let result = self.generate_step(&llm, &wire, cancel).await?;
            self.context
                .append_message(std::slice::from_ref(&result.message))
                .await?;
            if let Some(usage) = &result.usage {
                self.context.update_token_count(usage.total()).await?;
            }
            self.context_usage = if llm.max_context_size > 0 {
                self.context.token_count() as f64 / llm.max_context_size as f64
            } else {
                0.0
            };
            wire.send(WireMessage::StatusUpdate(StatusUpdate {
                context_usage: Some(self.context_usage),
            }));

            let tool_calls = result.message.tool_calls.clone().unwrap_or_default();
            if tool_calls.is_empty() {
                break;
            }

            let interrupted = self.dispatch_tool_calls(&wire, &tool_calls, cancel).await?;
            if interrupted {
                wire.send(WireMessage::StepInterrupted(StepInterrupted {}));
                return Err(SoulError::RunCancelled);
            }

            if let Some(dmail) = self.agent.runtime.denwa_renji.fetch_pending_dmail() {
                debug!(checkpoint_id = dmail.checkpoint_id, "d-mail armed, reverting");
                self.context.revert_to(dmail.checkpoint_id).await?;
                self.context.checkpoint(true).await?;
                self.agent
                    .runtime
                    .denwa_renji
                    .set_n_checkpoints(self.context.n_checkpoints());
                self.context
                    .append_message(&[Message::user(&dmail.message)])
                    .await?;
            }

            n += 1;
            if n > self.max_steps_per_run {
                wire.send(WireMessage::StepInterrupted(StepInterrupted {}));
                return Err(SoulError::MaxStepsReached(n - 1));
            }
        }

        Ok(())
    }
}

fn part_to_wire(part: &StreamedMessagePart) -> WireMessage {
    match part {
        StreamedMessagePart::Content(p) => WireMessage::ContentPart(p.clone()),
        StreamedMessagePart::ToolCall(tc) => WireMessage::ToolCall(tc.clone()),
        StreamedMessagePart::ToolCallPart(p) => WireMessage::ToolCallPart(p.clone()),
    }
}

/// Fold a raw part into the partial assistant message kept for
/// cancellation recovery.
fn accumulate(message: &mut Message, part: &StreamedMessagePart) {
    match part {
        StreamedMessagePart::Content(p) => {
            if let Some(last) = message.content.last_mut() {
                if last.merge_in_place(p) {
                    return;
                }
            }
            message.content.push(p.clone());
        }
        StreamedMessagePart::ToolCall(tc) => {
            message
                .tool_calls
                .get_or_insert_with(Vec::new)
                .push(tc.clone());
        }
        StreamedMessagePart::ToolCallPart(p) => {
            if let Some(last) = message.tool_calls.as_mut().and_then(|v| v.last_mut()) {
                last.function.arguments.push_str(&p.arguments_part);
            }
        }
    }
}

/// Bridge the approval broker onto the wire for the duration of a tool
/// dispatch round: broker requests become `ApprovalRequest` messages, and
/// their resolutions are mapped back and announced.
async fn forward_approvals(approval: Arc<Approval>, wire: Arc<Wire>) {
    while let Some(request) = approval.fetch_request().await {
        let (msg, rx) = ApprovalRequestMsg::channel(request);
        wire.send(WireMessage::ApprovalRequest(msg.clone()));
        let approval = approval.clone();
        let wire = wire.clone();
        tokio::spawn(async move {
            // the sender is dropped when the front-end abandons the
            // request; the broker then keeps the tool waiting, which is
            // resolved by the tool task's own cancellation
            if let Ok(response) = rx.await {
                // announce first: the broker resolution unblocks the tool,
                // whose result must not precede the resolution on the wire
                wire.send(WireMessage::ApprovalRequestResolved(ApprovalRequestResolved {
                    request_id: msg.id.clone(),
                    response,
                }));
                let _ = approval.resolve_request(&msg.id, response);
            }
        });
    }
}
