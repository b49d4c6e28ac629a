// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod approval;
pub mod builtin;
pub mod environment;
pub mod tool;
pub mod toolset;

pub use approval::{Approval, ApprovalResponse, Request};
pub use environment::Environment;
pub use tool::{
    parse_params, Tool, ToolContext, ToolError, ToolErrorKind, ToolOk, ToolOutput, ToolResult,
    ToolReturnValue,
};
pub use toolset::{await_handle_result, HandleResult, Toolset};
