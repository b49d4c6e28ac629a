// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;
use std::sync::Arc;

use anyhow::bail;

use yurei_config::{LlmModel, LlmProvider, ProviderType};

use crate::anthropic::Anthropic;
use crate::google::GoogleGenAI;
use crate::kimi::Kimi;
use crate::mock::EchoProvider;
use crate::openai_legacy::OpenAILegacy;
use crate::openai_responses::OpenAIResponses;
use crate::provider::ChatProvider;

pub const USER_AGENT: &str = concat!("yurei/", env!("CARGO_PKG_VERSION"));

/// A feature bit of the configured model.  Capabilities gate message
/// content before any HTTP is issued; they are declared in configuration,
/// never inferred from the model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelCapability {
    ImageIn,
    Thinking,
}

impl ModelCapability {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelCapability::ImageIn => "image_in",
            ModelCapability::Thinking => "thinking",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image_in" => Some(ModelCapability::ImageIn),
            "thinking" => Some(ModelCapability::Thinking),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The configured model bundle handed to the soul.
#[derive(Clone)]
pub struct Llm {
    pub provider: Arc<dyn ChatProvider>,
    pub max_context_size: usize,
    pub capabilities: HashSet<ModelCapability>,
}

impl Llm {
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }
}

/// Construct an [`Llm`] from configuration.
pub fn create_llm(
    provider: &LlmProvider,
    model: &LlmModel,
    session_id: Option<&str>,
) -> anyhow::Result<Llm> {
    let capabilities: HashSet<ModelCapability> = model
        .capabilities
        .iter()
        .filter_map(|c| ModelCapability::parse(c))
        .collect();

    let require_key = || -> anyhow::Result<String> {
        match provider.resolve_api_key() {
            Some(k) => Ok(k),
            None => bail!(
                "no API key configured for provider '{}'; set api_key_env or the canonical env var",
                provider.provider_type
            ),
        }
    };

    let chat_provider: Arc<dyn ChatProvider> = match provider.provider_type {
        ProviderType::Kimi => {
            let mut headers: Vec<(String, String)> =
                vec![("User-Agent".into(), USER_AGENT.into())];
            headers.extend(
                provider
                    .custom_headers
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
            let mut kimi = Kimi::new(
                model.name.clone(),
                provider.base_url.as_deref(),
                require_key()?,
                headers,
            );
            if let Some(id) = session_id {
                kimi = kimi.with_prompt_cache_key(id);
            }
            Arc::new(kimi)
        }
        ProviderType::OpenaiLegacy => Arc::new(OpenAILegacy::new(
            model.name.clone(),
            provider.base_url.as_deref(),
            require_key()?,
            std::env::var("OPENAI_REASONING_KEY").ok(),
        )),
        ProviderType::OpenaiResponses => Arc::new(OpenAIResponses::new(
            model.name.clone(),
            provider.base_url.as_deref(),
            require_key()?,
        )),
        ProviderType::Anthropic => Arc::new(Anthropic::new(
            model.name.clone(),
            provider.base_url.as_deref(),
            require_key()?,
        )),
        ProviderType::GoogleGenai => Arc::new(GoogleGenAI::new(
            model.name.clone(),
            provider.base_url.as_deref(),
            require_key()?,
        )),
        ProviderType::Mock => Arc::new(EchoProvider),
    };

    Ok(Llm {
        provider: chat_provider,
        max_context_size: model.max_context_size,
        capabilities,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_parsing() {
        assert_eq!(ModelCapability::parse("image_in"), Some(ModelCapability::ImageIn));
        assert_eq!(ModelCapability::parse("thinking"), Some(ModelCapability::Thinking));
        assert_eq!(ModelCapability::parse("telepathy"), None);
    }

    #[test]
    fn capabilities_come_from_config_only() {
        // a "thinking"-looking model name grants nothing by itself
        let provider = LlmProvider {
            provider_type: ProviderType::Mock,
            ..Default::default()
        };
        let model = LlmModel {
            name: "super-thinking-preview".into(),
            max_context_size: 1000,
            capabilities: vec![],
        };
        let llm = create_llm(&provider, &model, None).unwrap();
        assert!(llm.capabilities.is_empty());
    }

    #[test]
    fn declared_capabilities_are_honored() {
        let provider = LlmProvider {
            provider_type: ProviderType::Mock,
            ..Default::default()
        };
        let model = LlmModel {
            name: "echo".into(),
            max_context_size: 1000,
            capabilities: vec!["thinking".into(), "image_in".into(), "bogus".into()],
        };
        let llm = create_llm(&provider, &model, None).unwrap();
        assert!(llm.capabilities.contains(&ModelCapability::Thinking));
        assert!(llm.capabilities.contains(&ModelCapability::ImageIn));
        assert_eq!(llm.capabilities.len(), 2);
    }
}
