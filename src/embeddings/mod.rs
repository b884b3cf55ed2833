// Embeddings module
// Provider contract, L2 normalization and the concrete HTTP clients


pub mod ollama;
pub mod openai;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{Config, EmbeddingBackend};

pub use ollama::OllamaClient;
pub use openai::OpenAiEmbeddings;

/// Added to the norm before dividing so an all-zero vector stays finite
pub const NORM_EPSILON: f64 = 1e-12;

/// Turns text into fixed-dimension vectors.
///
/// Implementations must return exactly one vector per input text, in input
/// order, and keep the dimensionality fixed for a given model.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}

/// Euclidean length of `vector`
#[inline]
pub fn l2_norm(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt()
}

/// Divide `vector` in place by its L2 norm plus [`NORM_EPSILON`]
#[inline]
pub fn normalize(vector: &mut [f32]) {
    let denominator = l2_norm(vector) + NORM_EPSILON;
    for value in vector.iter_mut() {
        *value = (f64::from(*value) / denominator) as f32;
    }
}

#[inline]
pub fn normalized(mut vector: Vec<f32>) -> Vec<f32> {
    normalize(&mut vector);
    vector
}

/// Dot product; equals cosine similarity for unit vectors
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Build the embedding client selected by `config.embedding.backend`
#[inline]
pub fn create_provider(config: &Config) -> crate::Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding.backend {
        EmbeddingBackend::Ollama => Ok(Arc::new(OllamaClient::new(config)?)),
        EmbeddingBackend::OpenAi => Ok(Arc::new(OpenAiEmbeddings::new(config)?)),
    }
}
