// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Full-stack integration: config -> session -> runtime -> default agent
//! -> soul, with persistence across process-like restarts.

use std::sync::Arc;

use tokio::sync::oneshot;

use yurei_config::{Config, ProviderType};
use yurei_core::{
    load_agent, run_soul, Context, Runtime, Session, UserInput, WireMessage, YureiSoul,
};
use yurei_model::{create_llm, Role};

// YUREI_SHARE_DIR is process-wide; serialize the tests that set it.
static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn mock_config() -> Arc<Config> {
    let mut config = Config::default();
    config.provider.provider_type = ProviderType::Mock;
    config.model.name = "echo".into();
    Arc::new(config)
}

async fn run_turn(soul: &mut YureiSoul, input: &str) -> Vec<WireMessage> {
    let (done_tx, done_rx) = oneshot::channel();
    let (_cancel_tx, cancel_rx) = oneshot::channel();
    run_soul(
        soul,
        UserInput::Text(input.to_string()),
        move |wire| async move {
            let mut ui = wire.ui_side(true);
            let mut seen = Vec::new();
            while let Ok(msg) = ui.receive().await {
                seen.push(msg);
            }
            let _ = done_tx.send(seen);
        },
        cancel_rx,
        None,
    )
    .await
    .expect("turn should succeed");
    done_rx.await.unwrap_or_default()
}

#[tokio::test]
async fn conversation_survives_a_restart() {
    let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let share = tempfile::tempdir().unwrap();
    std::env::set_var("YUREI_SHARE_DIR", share.path());
    let work = tempfile::tempdir().unwrap();

    let config = mock_config();
    let session = Session::create(work.path()).await.unwrap();
    let llm = create_llm(&config.provider, &config.model, Some(&session.id)).unwrap();

    // first "process": one turn against the echo model
    {
        let runtime = Arc::new(
            Runtime::create(config.clone(), Some(llm.clone()), Arc::new(session.clone()), true)
                .await
                .unwrap(),
        );
        let agent = load_agent(None, runtime).unwrap();
        let mut context = Context::new(session.context_file.clone());
        context.restore().await.unwrap();
        let mut soul = YureiSoul::new(agent, context);

        let messages = run_turn(&mut soul, "first question").await;
        assert!(messages
            .iter()
            .any(|m| matches!(m, WireMessage::TurnBegin(_))));
        let history = soul.context().history();
        assert_eq!(history.last().unwrap().role, Role::Assistant);
        assert_eq!(history.last().unwrap().extract_text(""), "first question");
    }

    // second "process": restore the same session and keep talking
    {
        let found = Session::continue_last(work.path())
            .await
            .unwrap()
            .expect("previous session is the last one");
        assert_eq!(found.id, session.id);

        let runtime = Arc::new(
            Runtime::create(config.clone(), Some(llm), Arc::new(found.clone()), true)
                .await
                .unwrap(),
        );
        let agent = load_agent(None, runtime).unwrap();
        let mut context = Context::new(found.context_file.clone());
        assert!(context.restore().await.unwrap(), "history must restore");
        let restored_len = context.history().len();
        assert!(restored_len >= 2, "user + assistant expected");
        assert!(
            context.history().iter().all(|m| m.role != Role::System),
            "the system prompt is never persisted"
        );

        let mut soul = YureiSoul::new(agent, context);
        run_turn(&mut soul, "second question").await;
        let history = soul.context().history();
        assert!(history.len() > restored_len);
        assert_eq!(history.last().unwrap().extract_text(""), "second question");
    }
}

#[tokio::test]
async fn default_agent_exposes_its_toolset_to_the_model() {
    let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let share = tempfile::tempdir().unwrap();
    std::env::set_var("YUREI_SHARE_DIR", share.path());
    let work = tempfile::tempdir().unwrap();

    let config = mock_config();
    let session = Session::create(work.path()).await.unwrap();
    let llm = create_llm(&config.provider, &config.model, None).unwrap();
    let runtime = Arc::new(
        Runtime::create(config, Some(llm), Arc::new(session.clone()), true)
            .await
            .unwrap(),
    );
    let agent = load_agent(None, runtime).unwrap();

    let schemas = agent.toolset.schemas();
    let names: Vec<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
    for expected in ["Shell", "ReadFile", "WriteFile", "Task", "SendDMail"] {
        assert!(names.contains(&expected), "missing tool {expected}");
    }
    for schema in &schemas {
        assert_eq!(schema.parameters["type"], "object", "{}", schema.name);
    }
}
