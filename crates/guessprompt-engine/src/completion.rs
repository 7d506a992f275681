use std::sync::Arc;

use anyhow::{bail, Context, Result};
use guessprompt_contracts::extract::{extract_first, field_paths, COMPLETION_TEXT_PATHS};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::CompletionConfig;
use crate::transport::{truncate_text, HttpTransport};

/// Minimal chat-completions client: one system message, one user message,
/// text back.
pub struct CompletionClient {
    transport: Arc<dyn HttpTransport>,
    config: CompletionConfig,
    api_key: String,
}

impl CompletionClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        config: CompletionConfig,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            config,
            api_key: api_key.into(),
        }
    }

    pub fn complete(&self, system: &str, user: &str) -> Result<String> {
        let endpoint = self.config.endpoint();
        let payload = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });
        debug!(%endpoint, model = %self.config.model, "requesting completion");

        let reply = self.transport.post_json(&endpoint, &self.api_key, &payload)?;
        if !reply.is_success() {
            bail!(
                "completion request failed ({}): {}",
                reply.status,
                truncate_text(&reply.body, 512)
            );
        }
        if reply.is_blank() {
            bail!("completion response was empty");
        }
        let parsed: Value =
            serde_json::from_str(&reply.body).context("completion response was not JSON")?;
        extract_first(&parsed, &field_paths(COMPLETION_TEXT_PATHS))
            .context("completion response carried no text")
    }
}
