// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_max_context_size() -> usize {
    128_000
}

fn default_max_steps() -> u32 {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_threshold_fraction() -> f64 {
    0.85
}

fn default_preserved_messages() -> usize {
    2
}

/// Which wire protocol the LLM provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    #[default]
    Kimi,
    OpenaiLegacy,
    OpenaiResponses,
    Anthropic,
    GoogleGenai,
    /// Scripted in-process provider; only reachable from tests and the
    /// `--mock` escape hatch.
    Mock,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderType::Kimi => "kimi",
            ProviderType::OpenaiLegacy => "openai_legacy",
            ProviderType::OpenaiResponses => "openai_responses",
            ProviderType::Anthropic => "anthropic",
            ProviderType::GoogleGenai => "google_genai",
            ProviderType::Mock => "mock",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProvider {
    #[serde(rename = "type", default)]
    pub provider_type: ProviderType,
    /// API base that ends before the protocol-specific path segment.
    pub base_url: Option<String>,
    /// Environment variable that holds the API key (read at runtime).
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer `api_key_env` in config files so secrets
    /// stay out of version-controlled files.
    pub api_key: Option<String>,
    /// Additional HTTP headers sent on every request.
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,
}

impl Default for LlmProvider {
    fn default() -> Self {
        Self {
            provider_type: ProviderType::Kimi,
            base_url: None,
            api_key_env: None,
            api_key: None,
            custom_headers: HashMap::new(),
        }
    }
}

impl LlmProvider {
    /// Resolve the API key: explicit value wins, then the configured env
    /// var, then the provider's canonical env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            return Some(key.clone());
        }
        if let Some(var) = &self.api_key_env {
            if let Ok(key) = std::env::var(var) {
                return Some(key);
            }
        }
        let canonical = match self.provider_type {
            ProviderType::Kimi => "KIMI_API_KEY",
            ProviderType::OpenaiLegacy | ProviderType::OpenaiResponses => "OPENAI_API_KEY",
            ProviderType::Anthropic => "ANTHROPIC_API_KEY",
            ProviderType::GoogleGenai => "GEMINI_API_KEY",
            ProviderType::Mock => return None,
        };
        std::env::var(canonical).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmModel {
    /// Model identifier forwarded to the provider API.
    pub name: String,
    #[serde(default = "default_max_context_size")]
    pub max_context_size: usize,
    /// Declared model capabilities: "image_in", "thinking".
    ///
    /// Capabilities are configuration, never inferred from the model name:
    /// an adapter either declares a capability or the runtime refuses
    /// content that needs it.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl Default for LlmModel {
    fn default() -> Self {
        Self {
            name: "kimi-for-coding".into(),
            max_context_size: default_max_context_size(),
            capabilities: Vec::new(),
        }
    }
}

/// Step-loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Hard cap on steps within one turn.
    #[serde(default = "default_max_steps")]
    pub max_steps_per_run: u32,
    /// Transient transport errors retried per step before the turn fails.
    #[serde(default = "default_max_retries")]
    pub max_retries_per_step: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_steps_per_run: default_max_steps(),
            max_retries_per_step: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Compaction triggers when `token_count > max_context_size × fraction`.
    #[serde(default = "default_threshold_fraction")]
    pub threshold_fraction: f64,
    /// Trailing user/assistant messages preserved verbatim.
    #[serde(default = "default_preserved_messages")]
    pub preserved_messages: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold_fraction: default_threshold_fraction(),
            preserved_messages: default_preserved_messages(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default)]
    pub model: LlmModel,
    #[serde(rename = "loop", default)]
    pub loop_limits: LoopConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    /// Per-tool knobs.
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default shell-command timeout in seconds; individual calls may pass
    /// a shorter value but never a longer one.
    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: u64,
}

fn default_shell_timeout() -> u64 {
    120
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_timeout_secs: default_shell_timeout(),
        }
    }
}

impl Config {
    /// Apply environment-variable overrides for provider/model settings.
    ///
    /// Returns the names of the variables that were applied (secrets
    /// redacted) so the caller can log them.
    pub fn augment_with_env(&mut self) -> Vec<String> {
        let mut applied = Vec::new();

        if let Ok(t) = std::env::var("YUREI_PROVIDER_TYPE") {
            let parsed = match t.as_str() {
                "kimi" => Some(ProviderType::Kimi),
                "openai_legacy" => Some(ProviderType::OpenaiLegacy),
                "openai_responses" => Some(ProviderType::OpenaiResponses),
                "anthropic" => Some(ProviderType::Anthropic),
                "google_genai" => Some(ProviderType::GoogleGenai),
                _ => None,
            };
            if let Some(p) = parsed {
                self.provider.provider_type = p;
                applied.push(format!("YUREI_PROVIDER_TYPE={t}"));
            }
        }

        let prefix = match self.provider.provider_type {
            ProviderType::Kimi => "KIMI",
            ProviderType::OpenaiLegacy | ProviderType::OpenaiResponses => "OPENAI",
            ProviderType::Anthropic => "ANTHROPIC",
            ProviderType::GoogleGenai => "GEMINI",
            ProviderType::Mock => return applied,
        };

        if let Ok(url) = std::env::var(format!("{prefix}_BASE_URL")) {
            self.provider.base_url = Some(url.clone());
            applied.push(format!("{prefix}_BASE_URL={url}"));
        }
        if std::env::var(format!("{prefix}_API_KEY")).is_ok() {
            self.provider.api_key_env = Some(format!("{prefix}_API_KEY"));
            applied.push(format!("{prefix}_API_KEY=******"));
        }
        if let Ok(name) = std::env::var(format!("{prefix}_MODEL_NAME")) {
            self.model.name = name.clone();
            applied.push(format!("{prefix}_MODEL_NAME={name}"));
        }
        if let Ok(size) = std::env::var(format!("{prefix}_MODEL_MAX_CONTEXT_SIZE")) {
            if let Ok(n) = size.parse::<usize>() {
                self.model.max_context_size = n;
                applied.push(format!("{prefix}_MODEL_MAX_CONTEXT_SIZE={size}"));
            }
        }
        if let Ok(caps) = std::env::var(format!("{prefix}_MODEL_CAPABILITIES")) {
            self.model.capabilities = caps
                .split(',')
                .map(|c| c.trim().to_ascii_lowercase())
                .filter(|c| c == "image_in" || c == "thinking")
                .collect();
            applied.push(format!("{prefix}_MODEL_CAPABILITIES={caps}"));
        }

        applied
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_parses_from_empty_toml() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.provider.provider_type, ProviderType::Kimi);
        assert_eq!(cfg.model.max_context_size, 128_000);
        assert_eq!(cfg.loop_limits.max_steps_per_run, 100);
        assert!((cfg.compaction.threshold_fraction - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn provider_type_round_trips() {
        let cfg: Config = toml::from_str(
            r#"
            [provider]
            type = "anthropic"
            base_url = "https://api.anthropic.com"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.provider.provider_type, ProviderType::Anthropic);
        let back = toml::to_string(&cfg).unwrap();
        assert!(back.contains("type = \"anthropic\""));
    }

    #[test]
    fn explicit_api_key_wins_over_env() {
        let provider = LlmProvider {
            api_key: Some("sk-explicit".into()),
            ..LlmProvider::default()
        };
        assert_eq!(provider.resolve_api_key().as_deref(), Some("sk-explicit"));
    }

    #[test]
    fn model_capabilities_default_empty() {
        let cfg = Config::default();
        assert!(cfg.model.capabilities.is_empty());
    }

    #[test]
    fn loop_limits_parse_partial_table() {
        let cfg: Config = toml::from_str(
            r#"
            [loop]
            max_steps_per_run = 7
            "#,
        )
        .unwrap();
        assert_eq!(cfg.loop_limits.max_steps_per_run, 7);
        assert_eq!(cfg.loop_limits.max_retries_per_step, 3);
    }
}
