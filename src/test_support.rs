// Deterministic in-process providers shared by unit tests

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::embeddings::EmbeddingProvider;
use crate::generation::TextGenerator;

pub(crate) const TEST_DIMENSION: usize = 256;

/// Bag-of-characters embedding. ASCII letters and punctuation are skipped so
/// the `Keyword:`/`Text:` scaffolding does not dominate short texts.
pub(crate) fn char_hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0; dimension];
    for c in text.chars() {
        if c.is_ascii() && !c.is_ascii_digit() {
            continue;
        }
        let bucket = (c as usize * 31 + 7) % dimension;
        vector[bucket] += 1.0;
    }
    vector
}

/// Embedder backed by [`char_hash_embedding`] that records every batch
pub(crate) struct HashEmbedder {
    dimension: usize,
    calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
}

impl HashEmbedder {
    pub(crate) fn new() -> Self {
        Self::with_dimension(TEST_DIMENSION)
    }

    pub(crate) fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "char-hash"
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes
            .lock()
            .expect("lock poisoned")
            .push(texts.len());
        Ok(texts
            .iter()
            .map(|text| char_hash_embedding(text, self.dimension))
            .collect())
    }
}

/// Returns fixed vectors keyed by exact input text, failing on anything else
pub(crate) struct TableEmbedder {
    pub(crate) entries: Vec<(String, Vec<f32>)>,
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    fn model_name(&self) -> &str {
        "table"
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|text| {
                self.entries
                    .iter()
                    .find(|(key, _)| key == text)
                    .map(|(_, vector)| vector.clone())
                    .ok_or_else(|| anyhow::anyhow!("no vector for {:?}", text))
            })
            .collect()
    }
}

/// Embedder whose every call fails
pub(crate) struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn embed_batch(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Err(anyhow::anyhow!("connection refused"))
    }
}

/// Embedder that sleeps before answering, for timeout tests
pub(crate) struct SlowEmbedder {
    pub(crate) delay: Duration,
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    fn model_name(&self) -> &str {
        "slow"
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        tokio::time::sleep(self.delay).await;
        Ok(texts
            .iter()
            .map(|text| char_hash_embedding(text, TEST_DIMENSION))
            .collect())
    }
}

/// Generator returning a canned response and remembering its prompts
pub(crate) struct ScriptedGenerator {
    response: Result<String, String>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    pub(crate) fn replying(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("lock poisoned")
            .push((system_prompt.to_string(), user_prompt.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response
            .clone()
            .map_err(|message| anyhow::anyhow!(message))
    }
}
