// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod agent;
pub mod broadcast;
pub mod compaction;
pub mod context;
pub mod dmail;
pub mod message;
pub mod metadata;
pub mod paths;
pub mod prompts;
pub mod session;
pub mod soul;
pub mod task;
pub mod wire;
pub mod yurei_soul;


pub use agent::{load_agent, Agent, BuiltinSystemPromptArgs, LaborMarket, Runtime};
pub use broadcast::{BroadcastQueue, QueueShutDown};
pub use compaction::SimpleCompaction;
pub use context::Context;
pub use dmail::{DMail, DenwaRenji, DenwaRenjiError, SendDMailTool};
pub use message::{check_message, system_part, tool_result_to_message};
pub use metadata::{load_metadata, save_metadata, share_dir, Metadata, WorkDirMeta};
pub use session::Session;
pub use soul::{run_soul, CancelSignal, Soul, SoulError, StatusSnapshot};
pub use task::{CreateSubagentTool, TaskTool};
pub use wire::{
    ApprovalRequestMsg, ApprovalRequestResolved, CompactionBegin, CompactionEnd, StatusUpdate,
    StepBegin, StepInterrupted, SubagentEvent, TurnBegin, UserInput, Wire, WireMessage,
    WireMessageEnvelope, WireSlot, WireUiSide,
};
pub use yurei_soul::YureiSoul;
