use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MatchError>;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Corpus contains no usable keyword/answer pairs")]
    EmptyCorpus,

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Store integrity error: {0}")]
    Integrity(String),

    #[error("Vector store unavailable at {}", .0.display())]
    StoreUnavailable(PathBuf),

    #[error("Embedding provider error: {0}")]
    Embedding(String),

    #[error("Generation provider error: {0}")]
    Generation(String),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Pipeline stage that talks to an external provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Embedding,
    Generation,
}

impl std::fmt::Display for Stage {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedding => f.write_str("Embedding"),
            Self::Generation => f.write_str("Generation"),
        }
    }
}

/// A stage that degraded without failing the whole request
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageWarning {
    StoreUnavailable { path: PathBuf },
    EmbeddingFailed { message: String },
    GenerationFailed { message: String },
    GenerationDisabled,
    StageTimedOut { stage: Stage, after_ms: u64 },
}

impl StageWarning {
    /// The soft counterpart of `error`, if the error is one a stage may
    /// absorb instead of failing the request
    #[inline]
    pub fn from_error(error: &MatchError) -> Option<Self> {
        match error {
            MatchError::StoreUnavailable(path) => {
                Some(Self::StoreUnavailable { path: path.clone() })
            }
            MatchError::Embedding(message) => Some(Self::EmbeddingFailed {
                message: message.clone(),
            }),
            MatchError::Generation(message) => Some(Self::GenerationFailed {
                message: message.clone(),
            }),
            MatchError::Timeout { stage, after } => Some(Self::StageTimedOut {
                stage: *stage,
                after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
            }),
            _ => None,
        }
    }
}

impl std::fmt::Display for StageWarning {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StoreUnavailable { path } => {
                write!(f, "vector store unavailable at {}", path.display())
            }
            Self::EmbeddingFailed { message } => write!(f, "query embedding failed: {}", message),
            Self::GenerationFailed { message } => write!(f, "generation failed: {}", message),
            Self::GenerationDisabled => f.write_str("generation is disabled"),
            Self::StageTimedOut { stage, after_ms } => {
                write!(f, "{} timed out after {}ms", stage, after_ms)
            }
        }
    }
}

/// Coarse classification of a [`MatchError`] for callers deciding how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing credentials or store files. Not retryable without operator action.
    Configuration,
    /// Embedding or generation round trip failed or timed out.
    Provider,
    /// Caller input rejected before any provider call.
    Validation,
    /// Store is corrupt or incompatible. Rebuild required.
    Integrity,
    Internal,
}

impl MatchError {
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::StoreUnavailable(_) => ErrorKind::Configuration,
            Self::Embedding(_) | Self::Generation(_) | Self::Timeout { .. } => ErrorKind::Provider,
            Self::Validation(_) | Self::EmptyCorpus => ErrorKind::Validation,
            Self::DimensionMismatch { .. } | Self::Integrity(_) => ErrorKind::Integrity,
            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }

    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Provider
    }
}

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod fusion;
pub mod generation;
pub mod http;
pub mod indexer;
pub mod pipeline;
pub mod retrieval;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;
