// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Loaded agents and their runtime collaborators.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context as _};
use chrono::Local;
use tracing::{debug, info};

use yurei_config::{
    default_agent_spec, load_agent_spec, Config, ResolvedAgentSpec, BUILTIN_SYSTEM_PROMPT_PATH,
};
use yurei_model::{Llm, USER_AGENT};
use yurei_tools::builtin::{
    FetchUrlTool, ReadFileTool, SetTodoListTool, ShellTool, StrReplaceFileTool, ThinkTool,
    WriteFileTool,
};
use yurei_tools::{Approval, Environment, Tool, Toolset};

use crate::dmail::{DenwaRenji, SendDMailTool};
use crate::paths::list_directory;
use crate::prompts;
use crate::session::Session;
use crate::task::{CreateSubagentTool, TaskTool};
use crate::wire::WireSlot;

/// Builtin system prompt arguments, substituted into every agent's prompt.
#[derive(Debug, Clone)]
pub struct BuiltinSystemPromptArgs {
    /// Current datetime as an ISO-8601 local timestamp.
    pub now: String,
    pub work_dir: String,
    pub work_dir_ls: String,
    pub agents_md: String,
}

impl BuiltinSystemPromptArgs {
    pub fn as_vars(&self) -> HashMap<String, String> {
        HashMap::from([
            ("NOW".to_string(), self.now.clone()),
            ("WORK_DIR".to_string(), self.work_dir.clone()),
            ("WORK_DIR_LS".to_string(), self.work_dir_ls.clone()),
            ("AGENTS_MD".to_string(), self.agents_md.clone()),
        ])
    }
}

async fn load_agents_md(work_dir: &Path) -> Option<String> {
    for name in ["AGENTS.md", "agents.md"] {
        let path = work_dir.join(name);
        if let Ok(text) = tokio::fs::read_to_string(&path).await {
            info!(path = %path.display(), "loaded agents.md");
            return Some(text.trim().to_string());
        }
    }
    debug!(work_dir = %work_dir.display(), "no AGENTS.md found");
    None
}

/// The per-turn collaborator bundle.  Each sub-agent receives a derived
/// runtime: always its own d-mail slot and wire slot; fixed sub-agents get
/// a private labor market while dynamic ones share the parent's.
#[derive(Clone)]
pub struct Runtime {
    pub config: Arc<Config>,
    pub llm: Option<Llm>,
    pub session: Arc<Session>,
    pub builtin_args: Arc<BuiltinSystemPromptArgs>,
    pub denwa_renji: Arc<DenwaRenji>,
    pub approval: Arc<Approval>,
    pub labor_market: Arc<LaborMarket>,
    pub environment: Arc<Environment>,
    pub wire_slot: WireSlot,
}

impl Runtime {
    pub async fn create(
        config: Arc<Config>,
        llm: Option<Llm>,
        session: Arc<Session>,
        yolo: bool,
    ) -> anyhow::Result<Runtime> {
        let (ls_output, agents_md, environment) = tokio::join!(
            list_directory(&session.work_dir),
            load_agents_md(&session.work_dir),
            Environment::detect(),
        );

        Ok(Runtime {
            config,
            llm,
            builtin_args: Arc::new(BuiltinSystemPromptArgs {
                now: Local::now().to_rfc3339(),
                work_dir: session.work_dir.display().to_string(),
                work_dir_ls: ls_output,
                agents_md: agents_md.unwrap_or_default(),
            }),
            session,
            denwa_renji: Arc::new(DenwaRenji::new()),
            approval: Arc::new(Approval::new(yolo)),
            labor_market: Arc::new(LaborMarket::new()),
            environment: Arc::new(environment),
            wire_slot: WireSlot::new(),
        })
    }

    /// Derived runtime for a fixed sub-agent: private labor market.
    pub fn for_fixed_subagent(&self) -> Runtime {
        Runtime {
            denwa_renji: Arc::new(DenwaRenji::new()),
            labor_market: Arc::new(LaborMarket::new()),
            wire_slot: WireSlot::new(),
            ..self.clone()
        }
    }

    /// Derived runtime for a dynamic sub-agent: shares the parent's labor
    /// market.
    pub fn for_dynamic_subagent(&self) -> Runtime {
        Runtime {
            denwa_renji: Arc::new(DenwaRenji::new()),
            wire_slot: WireSlot::new(),
            ..self.clone()
        }
    }
}

/// The loaded agent.
#[derive(Clone)]
pub struct Agent {
    pub name: String,
    pub system_prompt: String,
    pub toolset: Arc<Toolset>,
    pub runtime: Arc<Runtime>,
}

/// The sub-agents available to the Task tool.  Fixed sub-agents come from
/// the agent spec; dynamic ones are registered mid-session by
/// CreateSubagent and shadow fixed ones on name collision.
#[derive(Default)]
pub struct LaborMarket {
    fixed: Mutex<Vec<(String, Arc<Agent>, String)>>,
    dynamic: Mutex<Vec<(String, Arc<Agent>)>>,
}

impl LaborMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_fixed_subagent(&self, name: &str, agent: Arc<Agent>, description: &str) {
        self.fixed
            .lock()
            .expect("labor market poisoned")
            .push((name.to_string(), agent, description.to_string()));
    }

    pub fn add_dynamic_subagent(&self, name: &str, agent: Arc<Agent>) {
        self.dynamic
            .lock()
            .expect("labor market poisoned")
            .push((name.to_string(), agent));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Agent>> {
        let dynamic = self.dynamic.lock().expect("labor market poisoned");
        if let Some((_, agent)) = dynamic.iter().rev().find(|(n, _)| n == name) {
            return Some(agent.clone());
        }
        drop(dynamic);
        self.fixed
            .lock()
            .expect("labor market poisoned")
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, agent, _)| agent.clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .fixed
            .lock()
            .expect("labor market poisoned")
            .iter()
            .map(|(n, _, _)| n.clone())
            .collect();
        names.extend(
            self.dynamic
                .lock()
                .expect("labor market poisoned")
                .iter()
                .map(|(n, _)| n.clone()),
        );
        names.dedup();
        names
    }

    pub fn fixed_descriptions(&self) -> Vec<(String, String)> {
        self.fixed
            .lock()
            .expect("labor market poisoned")
            .iter()
            .map(|(n, _, d)| (n.clone(), d.clone()))
            .collect()
    }
}

/// Load an agent from a spec file (or the embedded default), building its
/// toolset and fixed sub-agents.
pub fn load_agent(agent_file: Option<&Path>, runtime: Arc<Runtime>) -> anyhow::Result<Agent> {
    let spec = match agent_file {
        Some(path) => {
            info!(agent_file = %path.display(), "loading agent");
            load_agent_spec(path)?
        }
        None => default_agent_spec(),
    };
    load_agent_from_spec(&spec, runtime)
}

fn load_agent_from_spec(spec: &ResolvedAgentSpec, runtime: Arc<Runtime>) -> anyhow::Result<Agent> {
    let system_prompt = load_system_prompt(spec, &runtime)?;

    // sub-agents load before tools: the Task tool's description embeds the
    // fixed sub-agent listing
    for (name, sub_spec) in &spec.subagents {
        debug!(subagent = %name, "loading fixed subagent");
        let sub_runtime = Arc::new(runtime.for_fixed_subagent());
        let subagent = load_agent(Some(&sub_spec.path), sub_runtime)?;
        runtime
            .labor_market
            .add_fixed_subagent(name, Arc::new(subagent), &sub_spec.description);
    }

    let toolset = Arc::new(Toolset::new(runtime.approval.clone()));
    let mut bad_tools: Vec<&str> = Vec::new();
    for name in &spec.tools {
        if spec.exclude_tools.iter().any(|t| t == name) {
            debug!(tool = %name, "excluded by agent spec");
            continue;
        }
        match build_tool(name, &runtime, &toolset) {
            Some(tool) => toolset.add(tool),
            None => bad_tools.push(name),
        }
    }
    if !bad_tools.is_empty() {
        bail!("invalid tools in agent spec: {bad_tools:?}");
    }
    info!(tools = ?toolset.names(), agent = %spec.name, "loaded tools");

    Ok(Agent {
        name: spec.name.clone(),
        system_prompt,
        toolset,
        runtime,
    })
}

fn load_system_prompt(spec: &ResolvedAgentSpec, runtime: &Runtime) -> anyhow::Result<String> {
    let template = if spec.system_prompt_path.to_string_lossy() == BUILTIN_SYSTEM_PROMPT_PATH {
        prompts::DEFAULT_SYSTEM_PROMPT.to_string()
    } else {
        std::fs::read_to_string(&spec.system_prompt_path)
            .with_context(|| {
                format!(
                    "cannot read system prompt {}",
                    spec.system_prompt_path.display()
                )
            })?
            .trim()
            .to_string()
    };
    let mut vars = runtime.builtin_args.as_vars();
    for (k, v) in &spec.system_prompt_args {
        vars.insert(k.clone(), v.clone());
    }
    Ok(prompts::substitute(&template, &vars))
}

/// The static tool registration table.  Unknown names are reported by the
/// caller as spec errors rather than crashing at dispatch time.
fn build_tool(
    name: &str,
    runtime: &Arc<Runtime>,
    toolset: &Arc<Toolset>,
) -> Option<Arc<dyn Tool>> {
    let work_dir = runtime.session.work_dir.clone();
    Some(match name {
        "Shell" => Arc::new(ShellTool::new(
            runtime.environment.clone(),
            work_dir,
            runtime.config.tools.shell_timeout_secs,
        )),
        "ReadFile" => Arc::new(ReadFileTool::new(work_dir)),
        "WriteFile" => Arc::new(WriteFileTool::new(work_dir)),
        "StrReplaceFile" => Arc::new(StrReplaceFileTool::new(work_dir)),
        "FetchURL" => Arc::new(FetchUrlTool::new(USER_AGENT)),
        "Think" => Arc::new(ThinkTool),
        "SetTodoList" => Arc::new(SetTodoListTool::new()),
        "Task" => Arc::new(TaskTool::new(runtime.clone())),
        "CreateSubagent" => Arc::new(CreateSubagentTool::new(
            runtime.clone(),
            Arc::downgrade(toolset),
        )),
        "SendDMail" => Arc::new(SendDMailTool::new(runtime.denwa_renji.clone())),
        _ => return None,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn runtime() -> Arc<Runtime> {
        let work = tempfile::tempdir().unwrap();
        let session = Session {
            id: "test-session".into(),
            work_dir: work.path().to_path_buf(),
            context_file: work.path().join("context.jsonl"),
            title: "test".into(),
            updated_at: 0.0,
        };
        // keep the tempdir alive for the duration of the test process
        std::mem::forget(work);
        Arc::new(
            Runtime::create(Arc::new(Config::default()), None, Arc::new(session), false)
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn default_agent_loads_all_builtin_tools() {
        let agent = load_agent(None, runtime().await).unwrap();
        let names = agent.toolset.names();
        for expected in ["Shell", "ReadFile", "Task", "CreateSubagent", "SendDMail"] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
        assert!(!agent.system_prompt.contains("${NOW}"), "placeholders substituted");
    }

    #[tokio::test]
    async fn unknown_tool_name_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let agent_file = dir.path().join("agent.yaml");
        std::fs::write(
            &agent_file,
            "version: 1\nagent:\n  extend: default\n  tools: [Shell, Imaginary]\n",
        )
        .unwrap();
        let err = load_agent(Some(&agent_file), runtime().await).unwrap_err();
        assert!(err.to_string().contains("Imaginary"));
    }

    #[tokio::test]
    async fn exclude_tools_removes_from_the_set() {
        let dir = tempfile::tempdir().unwrap();
        let agent_file = dir.path().join("agent.yaml");
        std::fs::write(
            &agent_file,
            "version: 1\nagent:\n  extend: default\n  exclude_tools: [Shell]\n",
        )
        .unwrap();
        let agent = load_agent(Some(&agent_file), runtime().await).unwrap();
        assert!(!agent.toolset.names().contains(&"Shell".to_string()));
        assert!(agent.toolset.names().contains(&"ReadFile".to_string()));
    }

    #[tokio::test]
    async fn labor_market_prefers_dynamic_on_collision() {
        let rt = runtime().await;
        let agent = Arc::new(load_agent(None, rt.clone()).unwrap());
        rt.labor_market.add_fixed_subagent("worker", agent.clone(), "fixed");
        assert!(rt.labor_market.get("worker").is_some());
        let dynamic = Arc::new(Agent {
            name: "worker-v2".into(),
            ..(*agent).clone()
        });
        rt.labor_market.add_dynamic_subagent("worker", dynamic);
        assert_eq!(rt.labor_market.get("worker").unwrap().name, "worker-v2");
    }
}
