
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{ChatMessage, TextGenerator, chat_messages};
use crate::config::Config;
use crate::http::HttpClient;

/// Non-streaming client for Ollama's `/api/chat`
#[derive(Debug, Clone)]
pub struct OllamaChat {
    base_url: Url,
    model: String,
    temperature: f32,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl OllamaChat {
    #[inline]
    pub fn new(config: &Config) -> crate::Result<Self> {
        Ok(Self {
            base_url: config.ollama_url()?,
            model: config.generation.model.clone(),
            temperature: config.generation.temperature,
            http: HttpClient::new(config.provider_timeout())
                .with_retry_attempts(config.retrieval.retry_attempts),
        })
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    #[inline]
    pub fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let url = self
            .base_url
            .join("/api/chat")
            .context("Failed to build chat URL")?;

        debug!("Requesting Ollama chat from {} at {}", self.model, url);

        let request = ChatRequest {
            model: &self.model,
            messages: chat_messages(system_prompt, user_prompt),
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        let response_text = self
            .http
            .post_json(&url, &request, None)
            .context("Failed to call Ollama chat")?;

        let response: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse Ollama chat response")?;

        Ok(response.message.content.trim().to_string())
    }
}

#[async_trait]
impl TextGenerator for OllamaChat {
    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }

    #[inline]
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let client = self.clone();
        let system_prompt = system_prompt.to_string();
        let user_prompt = user_prompt.to_string();
        tokio::task::spawn_blocking(move || client.chat(&system_prompt, &user_prompt))
            .await
            .context("Ollama generation task failed")?
    }
}
