#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use async_trait::async_trait;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::EmbeddingProvider;
use crate::config::Config;
use crate::http::HttpClient;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &Config) -> crate::Result<Self> {
        let base_url = config.ollama_url()?;

        let http = HttpClient::new(config.provider_timeout())
            .with_retry_attempts(config.retrieval.retry_attempts);

        Ok(Self {
            base_url,
            model: config.embedding.model.clone(),
            http,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = self.http.with_timeout(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.http = self.http.with_retry_attempts(attempts);
        self
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Confirm the server answers and serves the configured embedding model
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        self.validate_model()
            .with_context(|| format!("Ollama at {} is not usable", self.base_url))?;
        info!("Ollama at {} serves {}", self.base_url, self.model);
        Ok(())
    }

    /// Fail unless the configured model appears in `/api/tags`
    #[inline]
    pub fn validate_model(&self) -> Result<()> {
        let models = self.list_models()?;
        if models.iter().any(|m| m.name == self.model) {
            return Ok(());
        }

        let names = models.iter().map(|m| m.name.as_str()).join(", ");
        warn!("Embedding model {} missing; server has [{}]", self.model, names);
        Err(anyhow::anyhow!(
            "Embedding model '{}' is not pulled on this server (available: {})",
            self.model,
            names
        ))
    }

    /// Models currently pulled on the server
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build tags URL")?;

        let body = self.http.get_text(&url).context("Failed to list Ollama models")?;
        let tags: ModelsResponse =
            serde_json::from_str(&body).context("Malformed /api/tags response")?;

        debug!("Ollama reports {} models", tags.models.len());
        Ok(tags.models)
    }

    /// Embed `texts` in a single request. Output order matches input order.
    #[inline]
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts with {}", texts.len(), self.model);

        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build embedding URL")?;

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response_text = self
            .http
            .post_json(&url, &request, None)
            .context("Ollama embed request failed")?;

        let response: EmbedResponse =
            serde_json::from_str(&response_text).context("Malformed /api/embed response")?;

        if response.embeddings.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            ));
        }

        debug!(
            "Received {} vectors of dimension {}",
            response.embeddings.len(),
            response.embeddings.first().map_or(0, Vec::len)
        );

        Ok(response.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }

    #[inline]
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.embed_texts(&texts))
            .await
            .context("Ollama embedding task failed")?
    }
}
