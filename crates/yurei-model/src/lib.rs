// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub(crate) mod openai_compat;
mod anthropic;
mod generate;
mod google;
mod kimi;
mod llm;
mod message;
mod mock;
mod openai_legacy;
mod openai_responses;
mod provider;

pub use anthropic::Anthropic;
pub use generate::{generate, GenerateResult};
pub use google::GoogleGenAI;
pub use kimi::Kimi;
pub use llm::{create_llm, Llm, ModelCapability, USER_AGENT};
pub use message::{
    AudioUrl, ContentPart, FunctionBody, ImageUrl, Message, Role, StreamedMessagePart, ToolCall,
    ToolCallPart,
};
pub use mock::{EchoProvider, RecordedRequest, ScriptedProvider};
pub use openai_legacy::OpenAILegacy;
pub use openai_responses::OpenAIResponses;
pub use provider::{ChatError, ChatProvider, EventStream, StreamEvent, TokenUsage, ToolSchema};
