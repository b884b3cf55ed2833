// Indexer module
// Corpus ingestion and the offline index build


use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embeddings::{EmbeddingProvider, normalized};
use crate::store::{Document, Manifest, VectorRecordStore, write_store};
use crate::{MatchError, Stage};

pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Raw corpus as it arrives on disk: either `{keyword: answer}` or
/// `[{"keyword": .., "answer": ..}]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Corpus {
    Mapping(Map<String, Value>),
    Records(Vec<Value>),
}

impl Corpus {
    #[inline]
    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            MatchError::Validation(format!(
                "corpus must be a JSON object of keyword to answer or an array of records: {}",
                e
            ))
        })
    }

    #[inline]
    pub fn from_path(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Canonical documents in corpus order. Entries with a blank keyword or
    /// answer are dropped; an empty result is [`MatchError::EmptyCorpus`].
    #[inline]
    pub fn into_documents(self) -> crate::Result<Vec<Document>> {
        let (documents, total) = match self {
            Self::Mapping(map) => {
                let total = map.len();
                let documents = map
                    .into_iter()
                    .filter_map(|(keyword, answer)| clean_pair(&keyword, answer.as_str()))
                    .collect::<Vec<_>>();
                (documents, total)
            }
            Self::Records(records) => {
                let total = records.len();
                let documents = records
                    .iter()
                    .filter_map(|record| {
                        let record = record.as_object()?;
                        let keyword = record.get("keyword").and_then(Value::as_str)?;
                        let answer = record
                            .get("answer")
                            .or_else(|| record.get("text"))
                            .and_then(Value::as_str);
                        clean_pair(keyword, answer)
                    })
                    .collect::<Vec<_>>();
                (documents, total)
            }
        };

        let dropped = total - documents.len();
        if dropped > 0 {
            warn!("Dropped {} corpus entries with a blank keyword or answer", dropped);
        }

        if documents.is_empty() {
            return Err(MatchError::EmptyCorpus);
        }

        debug!("Ingested {} documents", documents.len());
        Ok(documents)
    }
}

fn clean_pair(keyword: &str, answer: Option<&str>) -> Option<Document> {
    let keyword = keyword.trim();
    let answer = answer?.trim();
    (!keyword.is_empty() && !answer.is_empty()).then(|| Document::new(keyword, answer))
}

/// Embeds documents in order-preserving batches and assembles a normalized store
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    expected_dimension: Option<usize>,
    timeout: Option<Duration>,
    show_progress: bool,
}

impl IndexBuilder {
    #[inline]
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
            expected_dimension: None,
            timeout: None,
            show_progress: false,
        }
    }

    #[inline]
    pub fn from_config(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self::new(embedder)
            .with_batch_size(config.embedding.batch_size as usize)
            .with_expected_dimension(config.embedding.dimension.map(|d| d as usize))
            .with_timeout(config.provider_timeout())
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[inline]
    pub fn with_expected_dimension(mut self, dimension: Option<usize>) -> Self {
        self.expected_dimension = dimension;
        self
    }

    /// Bound on each provider round trip
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Draw a progress bar on stderr when a terminal is attached
    #[inline]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    #[inline]
    pub async fn build(&self, corpus: Corpus) -> crate::Result<VectorRecordStore> {
        self.build_documents(corpus.into_documents()?).await
    }

    /// Embed `documents` and return the in-memory store, position `i` holding
    /// the vector of `documents[i]`
    #[inline]
    pub async fn build_documents(
        &self,
        documents: Vec<Document>,
    ) -> crate::Result<VectorRecordStore> {
        if documents.is_empty() {
            return Err(MatchError::EmptyCorpus);
        }

        info!(
            "Embedding {} documents with {} in batches of {}",
            documents.len(),
            self.embedder.model_name(),
            self.batch_size
        );

        let bar = self.progress_bar(documents.len());
        let mut dimension = self.expected_dimension;
        let mut vectors = Vec::new();

        for batch in documents.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(Document::embedding_text).collect();
            let embeddings = self.embed(texts).await?;

            if embeddings.len() != batch.len() {
                return Err(MatchError::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    embeddings.len(),
                    batch.len()
                )));
            }

            for embedding in embeddings {
                if embedding.is_empty() {
                    return Err(MatchError::Embedding(
                        "provider returned an empty vector".to_string(),
                    ));
                }
                let expected = *dimension.get_or_insert(embedding.len());
                if embedding.len() != expected {
                    return Err(MatchError::DimensionMismatch {
                        expected,
                        actual: embedding.len(),
                    });
                }
                vectors.extend(normalized(embedding));
            }

            bar.inc(batch.len() as u64);
            debug!("Embedded batch of {} documents", batch.len());
        }

        bar.finish_and_clear();

        VectorRecordStore::new(dimension.unwrap_or(0), vectors, documents)
    }

    /// Build from `corpus` and persist into `dir`, replacing any previous store
    #[inline]
    pub async fn build_and_persist(
        &self,
        corpus: Corpus,
        dir: &Path,
        display_names: HashMap<String, String>,
    ) -> crate::Result<Manifest> {
        let store = self.build(corpus).await?.with_display_names(display_names);
        write_store(dir, &store, self.embedder.model_name())
    }

    async fn embed(&self, texts: Vec<String>) -> crate::Result<Vec<Vec<f32>>> {
        let request = self.embedder.embed_batch(texts);
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, request)
                .await
                .map_err(|_| MatchError::Timeout {
                    stage: Stage::Embedding,
                    after: timeout,
                })?,
            None => request.await,
        };
        result.map_err(|e| MatchError::Embedding(format!("{:#}", e)))
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if self.show_progress && console::user_attended_stderr() {
            ProgressBar::new(len as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {wide_bar}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        }
    }
}
