// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod agentspec;
pub mod loader;
pub mod schema;

pub use agentspec::{
    default_agent_spec, load_agent_spec, AgentSpecError, Maybe, ResolvedAgentSpec, SubagentSpec,
    BUILTIN_SYSTEM_PROMPT_PATH,
};
pub use loader::{load_config, ConfigError};
pub use schema::{
    CompactionConfig, Config, LlmModel, LlmProvider, LoopConfig, ProviderType,
};
