// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{parse_params, Tool, ToolContext, ToolError, ToolOk, ToolReturnValue};

const DEFAULT_MAX_LENGTH: usize = 40_000;

#[derive(Deserialize)]
struct Params {
    url: String,
    /// Cap on returned characters.
    max_length: Option<usize>,
}

pub struct FetchUrlTool {
    client: reqwest::Client,
}

impl FetchUrlTool {
    pub fn new(user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &str {
        "FetchURL"
    }

    fn description(&self) -> &str {
        "Fetch a URL. HTML responses are reduced to readable text; other \
         text responses are returned as-is."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "The http(s) URL to fetch" },
                "max_length": { "type": "integer", "description": "Maximum characters to return" }
            },
            "required": ["url"]
        })
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> ToolReturnValue {
        let params: Params = match parse_params(args) {
            Ok(p) => p,
            Err(e) => return e.into(),
        };
        if !params.url.starts_with("http://") && !params.url.starts_with("https://") {
            return ToolError::validate("only http(s) URLs are supported").into();
        }
        debug!(url = %params.url, "fetching url");

        let resp = match self.client.get(&params.url).send().await {
            Ok(r) => r,
            Err(e) => {
                return ToolError::generic(format!("request failed: {e}"), "Fetch failed").into()
            }
        };
        if !resp.status().is_success() {
            return ToolError::generic(
                format!("server returned status {}", resp.status()),
                format!("HTTP {}", resp.status().as_u16()),
            )
            .into();
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => {
                return ToolError::generic(format!("cannot read body: {e}"), "Fetch failed").into()
            }
        };

        let text = if content_type.contains("text/html") {
            html2text::from_read(body.as_bytes(), 100)
        } else {
            body
        };
        let max = params.max_length.unwrap_or(DEFAULT_MAX_LENGTH);
        let truncated: String = text.chars().take(max).collect();
        let note = if truncated.len() < text.len() {
            Some(format!("Truncated to {max} characters."))
        } else {
            None
        };
        let mut ok = ToolOk::new(truncated);
        if let Some(n) = note {
            ok = ok.with_message(n);
        }
        ok.into()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::Approval;
    use std::sync::Arc;
    use yurei_model::ToolCall;

    fn ctx() -> ToolContext {
        ToolContext {
            tool_call: ToolCall::new("c1", "FetchURL", "{}"),
            approval: Arc::new(Approval::new(true)),
        }
    }

    #[tokio::test]
    async fn non_http_scheme_is_rejected() {
        let t = FetchUrlTool::new("test-agent");
        let ret = t.call(&ctx(), json!({"url": "file:///etc/passwd"})).await;
        assert!(ret.is_error());
    }
}
