// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use yurei_config::load_config;
use yurei_core::{load_agent, Context, Runtime, Session, YureiSoul};
use yurei_frontend::{run_print, run_shell, run_stream_json};
use yurei_model::create_llm;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("YUREI_LOG")
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Arc::new(load_config(cli.config.as_deref())?);
    let work_dir: PathBuf = match &cli.work_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };

    if cli.list_sessions {
        for session in Session::list(&work_dir).await? {
            println!("{}  (updated {})", session.id, session.updated_at);
        }
        return Ok(());
    }

    let session = if let Some(id) = &cli.session {
        Session::find(&work_dir, id)
            .await?
            .with_context(|| format!("no session {id} in {}", work_dir.display()))?
    } else if cli.continue_ {
        match Session::continue_last(&work_dir).await? {
            Some(s) => s,
            None => Session::create(&work_dir).await?,
        }
    } else {
        Session::create(&work_dir).await?
    };
    debug!(session = %session.id, "using session");

    let llm = create_llm(&config.provider, &config.model, Some(&session.id))?;
    let runtime = Arc::new(
        Runtime::create(config, Some(llm), Arc::new(session.clone()), cli.yolo).await?,
    );
    let agent = load_agent(cli.agent_file.as_deref(), runtime)?;

    let mut context = Context::new(session.context_file.clone());
    context.restore().await?;
    let mut soul = YureiSoul::new(agent, context);

    if cli.stream_json {
        run_stream_json(&mut soul, cli.wire_file.clone()).await?;
    } else if cli.print {
        let prompt = match cli.prompt.clone() {
            Some(p) => p,
            None => {
                let mut buffer = String::new();
                use std::io::Read as _;
                std::io::stdin().read_to_string(&mut buffer)?;
                buffer.trim().to_string()
            }
        };
        if prompt.is_empty() {
            bail!("print mode needs a prompt (argument or stdin)");
        }
        run_print(&mut soul, &prompt, cli.wire_file.clone())
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
    } else {
        run_shell(&mut soul, cli.prompt.clone(), cli.wire_file.clone()).await?;
    }

    Ok(())
}
