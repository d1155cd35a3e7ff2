//! Language-model abstraction and chat-completion providers.
//!
//! A [`Prompt`] is an ordered list of role-tagged messages, sent to the
//! chat APIs as-is.
//!
//! Providers:
//! - **[`OpenAIChat`]**: `POST /v1/chat/completions`, needs `OPENAI_API_KEY`.
//! - **[`OllamaChat`]**: `POST /api/chat` on a local Ollama instance.
//!
//! Both share the retry policy in [`crate::retry`].

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::models::Role;
use crate::retry::{build_client, normalize_base_url, JsonEndpoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

impl From<Role> for PromptRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => PromptRole::User,
            Role::Assistant => PromptRole::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub messages: Vec<PromptMessage>,
}

impl Prompt {
    pub fn push(&mut self, role: PromptRole, content: impl Into<String>) {
        self.messages.push(PromptMessage {
            role,
            content: content.into(),
        });
    }
}

/// Produces a completion for a prompt.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-3.5-turbo"`).
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &Prompt, temperature: f32) -> Result<String>;
}

// ============ OpenAI ============

const OPENAI_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAIChat {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    max_retries: u32,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base = normalize_base_url(config.url.as_deref().unwrap_or(OPENAI_BASE_URL));
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_key,
            url: format!("{}/v1/chat/completions", base),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &Prompt, temperature: f32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": prompt.messages,
            "temperature": temperature,
        });
        let json = JsonEndpoint {
            client: &self.client,
            url: &self.url,
            bearer: Some(&self.api_key),
            service: "OpenAI",
            max_retries: self.max_retries,
        }
        .post(&body)
        .await?;
        parse_openai_completion(&json)
    }
}

fn parse_openai_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.pointer("/message/content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

// ============ Ollama ============

const OLLAMA_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaChat {
    client: reqwest::Client,
    url: String,
    model: String,
    max_retries: u32,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let base = normalize_base_url(config.url.as_deref().unwrap_or(OLLAMA_BASE_URL));
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: format!("{}/api/chat", base),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &Prompt, temperature: f32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": prompt.messages,
            "stream": false,
            "options": { "temperature": temperature },
        });
        let json = JsonEndpoint {
            client: &self.client,
            url: &self.url,
            bearer: None,
            service: "Ollama",
            max_retries: self.max_retries,
        }
        .post(&body)
        .await?;
        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))
    }
}

pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
