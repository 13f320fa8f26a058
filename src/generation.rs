//! Text generation providers.
//!
//! Used by [`crate::retrieval::answer`] to turn retrieved context into an
//! answer. `generation.provider = "disabled"` means no provider is built and
//! answers carry only their sources.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::{credential, GenerationConfig, OPENAI_API_KEY};
use crate::openai;

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Chat completions against the OpenAI API.
pub struct OpenAIChatProvider {
    model: String,
    max_retries: u32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIChatProvider {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;
        Ok(Self {
            model,
            max_retries: config.max_retries,
            api_key: credential(OPENAI_API_KEY)?,
            client: openai::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAIChatProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
        });
        let json = openai::post_with_retry(
            &self.client,
            openai::CHAT_COMPLETIONS_URL,
            &self.api_key,
            &body,
            self.max_retries,
        )
        .await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

/// Build the configured provider; `None` when generation is disabled.
pub fn create_provider(config: &GenerationConfig) -> Result<Option<Box<dyn GenerationProvider>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => Ok(Some(Box::new(OpenAIChatProvider::new(config)?))),
        other => bail!("Unknown generation provider: {}", other),
    }
}
