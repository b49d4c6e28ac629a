// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::Parser;

/// A terminal AI agent runtime.
#[derive(Parser, Debug)]
#[command(name = "yurei", version, about)]
pub struct Cli {
    /// Prompt to start with.  In print mode this is the whole request;
    /// in the interactive shell it becomes the first input.
    pub prompt: Option<String>,

    /// Non-interactive mode: run one turn, print the result, exit.
    /// Reads the prompt from stdin when none is given.
    #[arg(short, long)]
    pub print: bool,

    /// Speak the stream-json protocol on stdin/stdout.
    #[arg(long)]
    pub stream_json: bool,

    /// Working directory for this session (defaults to the current one).
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Continue the most recent session of the working directory.
    #[arg(short = 'c', long = "continue")]
    pub continue_: bool,

    /// Resume a specific session by id.
    #[arg(long)]
    pub session: Option<String>,

    /// List the sessions of the working directory and exit.
    #[arg(long)]
    pub list_sessions: bool,

    /// Skip all approval prompts.  Every side-effecting tool call runs
    /// unattended; use with care.
    #[arg(long)]
    pub yolo: bool,

    /// Agent spec file to load instead of the builtin default agent.
    #[arg(long)]
    pub agent_file: Option<PathBuf>,

    /// Config file to load instead of the default location.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Record all wire messages of each turn to this JSONL file.
    #[arg(long)]
    pub wire_file: Option<PathBuf>,
}
