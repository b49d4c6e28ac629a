// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Agent specification files.
//!
//! An agent spec is a YAML document declaring the agent's name, system
//! prompt, tool list and fixed sub-agents.  Specs can extend other specs;
//! each field carries three-valued semantics: *absent* (inherit from the
//! base), *explicit null* (explicitly empty), or a value.  Scalars
//! overwrite, lists replace, maps merge with the child winning on key
//! collisions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;

/// Sentinel system-prompt path resolved by the agent loader to the
/// embedded default prompt instead of a file read.
pub const BUILTIN_SYSTEM_PROMPT_PATH: &str = "<builtin:default>";

#[derive(Debug, Error)]
pub enum AgentSpecError {
    #[error("agent spec file not found: {0}")]
    NotFound(PathBuf),
    #[error("invalid YAML in agent spec file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unsupported agent spec version: {0}")]
    Version(u32),
    #[error("agent {0} is required")]
    MissingField(&'static str),
    #[error("cannot read agent spec file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Tagged optional distinguishing "not set in this file" from "explicitly
/// empty".  Absent fields deserialize to `Inherit`, explicit `null` to
/// `Null`, anything else to `Value`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Maybe<T> {
    #[default]
    Inherit,
    Null,
    Value(T),
}

impl<T> Maybe<T> {
    pub fn is_inherit(&self) -> bool {
        matches!(self, Maybe::Inherit)
    }

    /// Inherit resolves to `base`, null and value stand on their own.
    fn or_inherit(self, base: Maybe<T>) -> Maybe<T> {
        match self {
            Maybe::Inherit => base,
            other => other,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Maybe<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // A present field is either null or a value; absence is handled by
        // `#[serde(default)]` which yields `Inherit`.
        Ok(match Option::<T>::deserialize(deserializer)? {
            None => Maybe::Null,
            Some(v) => Maybe::Value(v),
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SubagentSpec {
    pub path: PathBuf,
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AgentSpec {
    #[serde(default)]
    extend: Option<String>,
    #[serde(default)]
    name: Maybe<String>,
    #[serde(default)]
    system_prompt_path: Maybe<PathBuf>,
    #[serde(default)]
    system_prompt_args: HashMap<String, String>,
    #[serde(default)]
    tools: Maybe<Vec<String>>,
    #[serde(default)]
    exclude_tools: Maybe<Vec<String>>,
    #[serde(default)]
    subagents: Maybe<HashMap<String, SubagentSpec>>,
}

#[derive(Debug, Deserialize)]
struct AgentSpecFile {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    agent: serde_yaml::Value,
}

fn default_version() -> u32 {
    1
}

/// A spec with every required field present and all extension resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAgentSpec {
    pub name: String,
    pub system_prompt_path: PathBuf,
    pub system_prompt_args: HashMap<String, String>,
    pub tools: Vec<String>,
    pub exclude_tools: Vec<String>,
    pub subagents: HashMap<String, SubagentSpec>,
}

/// The embedded default agent: the full builtin tool surface with the
/// builtin system prompt.
fn builtin_default() -> AgentSpec {
    AgentSpec {
        extend: None,
        name: Maybe::Value("yurei".into()),
        system_prompt_path: Maybe::Value(PathBuf::from(BUILTIN_SYSTEM_PROMPT_PATH)),
        system_prompt_args: HashMap::new(),
        tools: Maybe::Value(
            [
                "Shell",
                "ReadFile",
                "WriteFile",
                "StrReplaceFile",
                "FetchURL",
                "Think",
                "SetTodoList",
                "Task",
                "CreateSubagent",
                "SendDMail",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        ),
        exclude_tools: Maybe::Value(Vec::new()),
        subagents: Maybe::Value(HashMap::new()),
    }
}

/// The resolved embedded default agent spec.
pub fn default_agent_spec() -> ResolvedAgentSpec {
    resolve(builtin_default()).expect("builtin default spec is complete")
}

/// Load an agent spec from `agent_file`, recursively resolving `extend`.
pub fn load_agent_spec(agent_file: &Path) -> Result<ResolvedAgentSpec, AgentSpecError> {
    let spec = load_raw(agent_file)?;
    resolve(spec)
}

fn resolve(spec: AgentSpec) -> Result<ResolvedAgentSpec, AgentSpecError> {
    debug_assert!(spec.extend.is_none(), "extension must be resolved already");
    let name = match spec.name {
        Maybe::Value(n) => n,
        _ => return Err(AgentSpecError::MissingField("name")),
    };
    let system_prompt_path = match spec.system_prompt_path {
        Maybe::Value(p) => p,
        _ => return Err(AgentSpecError::MissingField("system_prompt_path")),
    };
    let tools = match spec.tools {
        Maybe::Value(t) => t,
        Maybe::Null => Vec::new(),
        Maybe::Inherit => return Err(AgentSpecError::MissingField("tools")),
    };
    let exclude_tools = match spec.exclude_tools {
        Maybe::Value(t) => t,
        _ => Vec::new(),
    };
    let subagents = match spec.subagents {
        Maybe::Value(s) => s,
        _ => HashMap::new(),
    };
    Ok(ResolvedAgentSpec {
        name,
        system_prompt_path,
        system_prompt_args: spec.system_prompt_args,
        tools,
        exclude_tools,
        subagents,
    })
}

fn load_raw(agent_file: &Path) -> Result<AgentSpec, AgentSpecError> {
    if !agent_file.is_file() {
        return Err(AgentSpecError::NotFound(agent_file.to_path_buf()));
    }
    let text = std::fs::read_to_string(agent_file).map_err(|source| AgentSpecError::Io {
        path: agent_file.to_path_buf(),
        source,
    })?;
    let file: AgentSpecFile = serde_yaml::from_str(&text)?;
    if file.version != 1 {
        return Err(AgentSpecError::Version(file.version));
    }
    let mut spec: AgentSpec = if file.agent.is_null() {
        AgentSpec::default()
    } else {
        serde_yaml::from_value(file.agent)?
    };

    let base_dir = agent_file.parent().unwrap_or_else(|| Path::new("."));
    if let Maybe::Value(p) = &mut spec.system_prompt_path {
        if p.to_string_lossy() != BUILTIN_SYSTEM_PROMPT_PATH && p.is_relative() {
            *p = base_dir.join(&*p);
        }
    }
    if let Maybe::Value(subagents) = &mut spec.subagents {
        for sub in subagents.values_mut() {
            if sub.path.is_relative() {
                sub.path = base_dir.join(&sub.path);
            }
        }
    }

    if let Some(extend) = spec.extend.take() {
        debug!(extend = %extend, file = %agent_file.display(), "resolving agent extension");
        let base = if extend == "default" {
            builtin_default()
        } else {
            load_raw(&base_dir.join(extend))?
        };
        spec = merge(base, spec);
    }
    Ok(spec)
}

/// Merge a child spec over its base: scalars and lists from the child
/// replace the base's unless inherited; `system_prompt_args` entries merge
/// with the child winning per key.
fn merge(base: AgentSpec, child: AgentSpec) -> AgentSpec {
    let mut system_prompt_args = base.system_prompt_args;
    for (k, v) in child.system_prompt_args {
        system_prompt_args.insert(k, v);
    }
    AgentSpec {
        extend: None,
        name: child.name.or_inherit(base.name),
        system_prompt_path: child.system_prompt_path.or_inherit(base.system_prompt_path),
        system_prompt_args,
        tools: child.tools.or_inherit(base.tools),
        exclude_tools: child.exclude_tools.or_inherit(base.exclude_tools),
        subagents: child.subagents.or_inherit(base.subagents),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn maybe_absent_is_inherit() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(default)]
            field: Maybe<Vec<String>>,
        }
        let h: Holder = serde_yaml::from_str("{}").unwrap();
        assert_eq!(h.field, Maybe::Inherit);
    }

    #[test]
    fn maybe_null_is_explicit_empty() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(default)]
            field: Maybe<Vec<String>>,
        }
        let h: Holder = serde_yaml::from_str("field: null").unwrap();
        assert_eq!(h.field, Maybe::Null);
    }

    #[test]
    fn default_spec_is_complete() {
        let spec = default_agent_spec();
        assert_eq!(spec.name, "yurei");
        assert!(spec.tools.contains(&"Shell".to_string()));
        assert!(spec.tools.contains(&"SendDMail".to_string()));
    }

    #[test]
    fn plain_spec_loads() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "prompt.md", "You are a test agent.");
        let agent = write_file(
            dir.path(),
            "agent.yaml",
            r#"
version: 1
agent:
  name: tester
  system_prompt_path: prompt.md
  tools:
    - Shell
    - ReadFile
"#,
        );
        let spec = load_agent_spec(&agent).unwrap();
        assert_eq!(spec.name, "tester");
        assert!(spec.system_prompt_path.ends_with("prompt.md"));
        assert!(spec.system_prompt_path.is_absolute() || spec.system_prompt_path.starts_with(dir.path()));
        assert_eq!(spec.tools, vec!["Shell", "ReadFile"]);
        assert!(spec.exclude_tools.is_empty());
        assert!(spec.subagents.is_empty());
    }

    #[test]
    fn missing_name_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let agent = write_file(
            dir.path(),
            "agent.yaml",
            "version: 1\nagent:\n  system_prompt_path: p.md\n  tools: []\n",
        );
        let err = load_agent_spec(&agent).unwrap_err();
        assert!(matches!(err, AgentSpecError::MissingField("name")));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let agent = write_file(dir.path(), "agent.yaml", "version: 2\nagent: {}\n");
        let err = load_agent_spec(&agent).unwrap_err();
        assert!(matches!(err, AgentSpecError::Version(2)));
    }

    #[test]
    fn extend_default_inherits_tools() {
        let dir = tempfile::tempdir().unwrap();
        let agent = write_file(
            dir.path(),
            "agent.yaml",
            "version: 1\nagent:\n  extend: default\n  name: custom\n",
        );
        let spec = load_agent_spec(&agent).unwrap();
        assert_eq!(spec.name, "custom");
        // tools inherited from the builtin default
        assert!(spec.tools.contains(&"Task".to_string()));
        assert_eq!(
            spec.system_prompt_path,
            PathBuf::from(BUILTIN_SYSTEM_PROMPT_PATH)
        );
    }

    #[test]
    fn extend_replaces_lists_and_merges_args() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "base_prompt.md", "base");
        write_file(
            dir.path(),
            "base.yaml",
            r#"
version: 1
agent:
  name: base
  system_prompt_path: base_prompt.md
  system_prompt_args:
    A: base-a
    B: base-b
  tools: [Shell, ReadFile]
"#,
        );
        let child = write_file(
            dir.path(),
            "child.yaml",
            r#"
version: 1
agent:
  extend: base.yaml
  system_prompt_args:
    B: child-b
    C: child-c
  tools: [Think]
"#,
        );
        let spec = load_agent_spec(&child).unwrap();
        assert_eq!(spec.name, "base", "scalar inherited");
        assert_eq!(spec.tools, vec!["Think"], "lists replace");
        assert_eq!(spec.system_prompt_args["A"], "base-a");
        assert_eq!(spec.system_prompt_args["B"], "child-b", "child wins on collision");
        assert_eq!(spec.system_prompt_args["C"], "child-c");
    }

    #[test]
    fn explicit_null_tools_resolve_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "p.md", "x");
        let agent = write_file(
            dir.path(),
            "agent.yaml",
            "version: 1\nagent:\n  name: bare\n  system_prompt_path: p.md\n  tools: null\n",
        );
        let spec = load_agent_spec(&agent).unwrap();
        assert!(spec.tools.is_empty());
    }

    #[test]
    fn subagent_paths_resolve_relative_to_agent_file() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "p.md", "x");
        let agent = write_file(
            dir.path(),
            "agent.yaml",
            r#"
version: 1
agent:
  name: parent
  system_prompt_path: p.md
  tools: []
  subagents:
    coder:
      path: coder/agent.yaml
      description: writes code
"#,
        );
        let spec = load_agent_spec(&agent).unwrap();
        let sub = &spec.subagents["coder"];
        assert!(sub.path.starts_with(dir.path()));
        assert_eq!(sub.description, "writes code");
    }
}
