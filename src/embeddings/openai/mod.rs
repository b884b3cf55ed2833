
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::EmbeddingProvider;
use crate::config::Config;
use crate::http::HttpClient;

/// Client for an OpenAI-compatible `/embeddings` endpoint
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    endpoint: Url,
    api_key: String,
    model: String,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbeddings {
    #[inline]
    pub fn new(config: &Config) -> crate::Result<Self> {
        let api_key = config.require_openai_key()?.to_string();
        let endpoint = config
            .openai_url()?
            .join("embeddings")
            .context("Failed to build embeddings URL")?;

        let http = HttpClient::new(config.provider_timeout())
            .with_retry_attempts(config.retrieval.retry_attempts);

        Ok(Self {
            endpoint,
            api_key,
            model: config.embedding.model.clone(),
            http,
        })
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    /// Embed `texts` in a single request. Output order matches input order.
    #[inline]
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Requesting {} OpenAI embeddings", texts.len());

        let request = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };

        let response_text = self
            .http
            .post_json(&self.endpoint, &request, Some(&self.api_key))
            .context("Failed to call OpenAI embeddings")?;

        let mut response: EmbeddingsResponse = serde_json::from_str(&response_text)
            .context("Failed to parse OpenAI embeddings response")?;

        if response.data.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.data.len()
            ));
        }

        // The API does not promise response order, only an index per item
        response.data.sort_by_key(|datum| datum.index);
        if response
            .data
            .iter()
            .enumerate()
            .any(|(position, datum)| datum.index != position)
        {
            return Err(anyhow::anyhow!(
                "OpenAI embeddings response has missing or duplicate indices"
            ));
        }

        Ok(response
            .data
            .into_iter()
            .map(|datum| datum.embedding)
            .collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }

    #[inline]
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.embed_texts(&texts))
            .await
            .context("OpenAI embedding task failed")?
    }
}
