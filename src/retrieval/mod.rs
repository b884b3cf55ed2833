// Retrieval module
// Lazily loaded store, query embedding and full-scan cosine ranking

#[cfg(test)]
mod tests;

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::embeddings::{EmbeddingProvider, dot, normalized};
use crate::store::{VectorRecordStore, load_store};
use crate::{MatchError, Stage, StageWarning};

/// One ranked match against the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    /// Always within `[0, 100]`, one decimal place
    pub match_percent: f64,
    pub keyword: String,
    pub text: String,
}

/// Candidates for one query plus any stage that degraded on the way
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieval {
    pub candidates: Vec<Candidate>,
    pub warnings: Vec<StageWarning>,
}

impl Retrieval {
    fn degraded(warning: StageWarning) -> Self {
        Self {
            candidates: Vec::new(),
            warnings: vec![warning],
        }
    }
}

/// Map a cosine similarity onto `[0, 100]` with one decimal place
#[inline]
pub fn match_percent(cosine: f32) -> f64 {
    let cosine = f64::from(cosine);
    if cosine.is_nan() {
        return 0.0;
    }
    let scaled = ((cosine + 1.0) / 2.0).clamp(0.0, 1.0) * 100.0;
    (scaled * 10.0).round() / 10.0
}

/// Top `k` positions of `store` by dot product with the unit vector `query`,
/// best first, ties broken by ascending position
#[inline]
pub fn rank(store: &VectorRecordStore, query: &[f32], k: usize) -> Vec<(usize, f32)> {
    store
        .vectors()
        .map(|vector| dot(vector, query))
        .map(comparable)
        .enumerate()
        .k_smallest_by(k, |a, b| best_first(*a, *b))
        .collect()
}

/// NaN sorts last and `-0.0` becomes `0.0` so equal scores tie on position
fn comparable(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else if score == 0.0 {
        0.0
    } else {
        score
    }
}

fn best_first(a: (usize, f32), b: (usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

/// Reads a store directory into memory; runs on the blocking pool
pub type StoreLoader = Arc<dyn Fn(&Path) -> crate::Result<VectorRecordStore> + Send + Sync>;

/// Answers queries against a store that is loaded from disk on first use
/// and shared by every later call
pub struct RetrievalEngine {
    store_dir: PathBuf,
    store: OnceCell<Arc<VectorRecordStore>>,
    loader: StoreLoader,
    embedder: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
}

impl RetrievalEngine {
    #[inline]
    pub fn new(
        store_dir: PathBuf,
        embedder: Arc<dyn EmbeddingProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            store_dir,
            store: OnceCell::new(),
            loader: Arc::new(load_store),
            embedder,
            timeout,
        }
    }

    #[inline]
    pub fn from_config(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self::new(config.store_dir(), embedder, config.provider_timeout())
    }

    /// Engine over an already built store; nothing is read from disk
    #[inline]
    pub fn with_store(
        store: VectorRecordStore,
        embedder: Arc<dyn EmbeddingProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            store_dir: PathBuf::new(),
            store: OnceCell::from(Arc::new(store)),
            loader: Arc::new(load_store),
            embedder,
            timeout,
        }
    }

    /// Replace how the store directory is read; the default is [`load_store`]
    #[inline]
    pub fn with_loader(mut self, loader: StoreLoader) -> Self {
        self.loader = loader;
        self
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.store.initialized()
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The cached store, loading it on first use. Concurrent first callers
    /// wait on a single load; a failed load leaves the cache empty so the
    /// next call tries again.
    #[inline]
    pub async fn store(&self) -> crate::Result<Arc<VectorRecordStore>> {
        self.store
            .get_or_try_init(|| async {
                let dir = self.store_dir.clone();
                let loader = Arc::clone(&self.loader);
                let store = tokio::task::spawn_blocking(move || loader(&dir))
                    .await
                    .map_err(|e| {
                        MatchError::Other(anyhow::anyhow!("store load task failed: {}", e))
                    })??;
                Ok::<_, MatchError>(Arc::new(store))
            })
            .await
            .map(Arc::clone)
    }

    /// Embed `query`, rank the store and return at most `k` candidates.
    ///
    /// A missing store, a provider failure or a provider timeout yields no
    /// candidates plus a warning. Integrity problems are errors.
    #[inline]
    pub async fn search(&self, query: &str, k: usize) -> crate::Result<Retrieval> {
        if k == 0 {
            return Ok(Retrieval::default());
        }

        let store = match self.store().await {
            Ok(store) => store,
            Err(e) => return soften(e),
        };
        if store.is_empty() {
            debug!("Store is empty, nothing to rank");
            return Ok(Retrieval::default());
        }

        let query_vector = match self.embed_query(query).await {
            Ok(vector) => vector,
            Err(e) => return soften(e),
        };

        if query_vector.len() != store.dimension() {
            error!(
                "Query embedding has {} dimensions but the store has {}",
                query_vector.len(),
                store.dimension()
            );
            return Err(MatchError::DimensionMismatch {
                expected: store.dimension(),
                actual: query_vector.len(),
            });
        }

        let candidates: Vec<Candidate> = rank(&store, &query_vector, k)
            .into_iter()
            .filter_map(|(position, score)| candidate_at(&store, position, score))
            .collect();

        info!(
            "Retrieved {} of {} records for a {}-char query",
            candidates.len(),
            store.len(),
            query.chars().count()
        );

        Ok(Retrieval {
            candidates,
            warnings: Vec::new(),
        })
    }

    async fn embed_query(&self, query: &str) -> crate::Result<Vec<f32>> {
        let request = self.embedder.embed_batch(vec![query.to_string()]);
        let vectors = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| MatchError::Timeout {
                stage: Stage::Embedding,
                after: self.timeout,
            })?
            .map_err(|e| MatchError::Embedding(format!("{:#}", e)))?;

        let mut vectors = vectors.into_iter();
        match (vectors.next(), vectors.next()) {
            (Some(vector), None) if !vector.is_empty() => Ok(normalized(vector)),
            _ => Err(MatchError::Embedding(
                "provider did not return exactly one vector for the query".to_string(),
            )),
        }
    }
}

fn candidate_at(store: &VectorRecordStore, position: usize, score: f32) -> Option<Candidate> {
    let document = store.document(position)?;
    Some(Candidate {
        name: store.display_name(position)?.to_string(),
        match_percent: match_percent(score),
        keyword: document.keyword.clone(),
        text: document.text.clone(),
    })
}

fn soften(error: MatchError) -> crate::Result<Retrieval> {
    match StageWarning::from_error(&error) {
        Some(warning) => {
            warn!("Retrieval degraded: {}", warning);
            Ok(Retrieval::degraded(warning))
        }
        None => Err(error),
    }
}
