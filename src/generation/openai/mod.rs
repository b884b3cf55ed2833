
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{ChatMessage, TextGenerator, chat_messages};
use crate::config::Config;
use crate::http::HttpClient;

/// Client for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    endpoint: Url,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChat {
    #[inline]
    pub fn new(config: &Config) -> crate::Result<Self> {
        let api_key = config.require_openai_key()?.to_string();
        let endpoint = config
            .openai_url()?
            .join("chat/completions")
            .context("Failed to build chat completions URL")?;

        let http = HttpClient::new(config.provider_timeout())
            .with_retry_attempts(config.retrieval.retry_attempts);

        Ok(Self {
            endpoint,
            api_key,
            model: config.generation.model.clone(),
            temperature: config.generation.temperature,
            max_tokens: config.generation.max_tokens,
            http,
        })
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    #[inline]
    pub fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        debug!(
            "Requesting chat completion from {} ({} prompt chars)",
            self.model,
            system_prompt.len() + user_prompt.len()
        );

        let request = ChatRequest {
            model: &self.model,
            messages: chat_messages(system_prompt, user_prompt),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response_text = self
            .http
            .post_json(&self.endpoint, &request, Some(&self.api_key))
            .context("Failed to call OpenAI chat completions")?;

        let response: ChatResponse = serde_json::from_str(&response_text)
            .context("Failed to parse chat completions response")?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat completions response contained no message"))?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl TextGenerator for OpenAiChat {
    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }

    #[inline]
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let client = self.clone();
        let system_prompt = system_prompt.to_string();
        let user_prompt = user_prompt.to_string();
        tokio::task::spawn_blocking(move || client.complete(&system_prompt, &user_prompt))
            .await
            .context("OpenAI generation task failed")?
    }
}
