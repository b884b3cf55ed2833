// Pipeline module
// Caller-facing retrieve and generate operations


use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::embeddings::create_provider;
use crate::fusion::{FusionOptions, GeneratedSegment, augment};
use crate::generation::{TextGenerator, create_generator};
use crate::retrieval::{Candidate, RetrievalEngine};
use crate::{MatchError, StageWarning};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrieveResponse {
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<StageWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub brief: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Fail instead of warning when no segments can be generated
    #[serde(default)]
    pub require_generation: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub candidates: Vec<Candidate>,
    pub generated_segments: Vec<GeneratedSegment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<StageWarning>,
}

/// Input bounds checked before any provider is called
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub min_brief_chars: usize,
}

impl Default for RequestLimits {
    #[inline]
    fn default() -> Self {
        Self {
            default_top_k: 10,
            max_top_k: 100,
            min_brief_chars: 10,
        }
    }
}

impl RequestLimits {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_top_k: config.retrieval.default_top_k,
            max_top_k: config.retrieval.max_top_k,
            min_brief_chars: config.retrieval.min_brief_chars,
        }
    }

    /// Trimmed `text`, or a validation error naming `field`
    #[inline]
    pub fn validate_text<'a>(&self, field: &str, text: &'a str) -> crate::Result<&'a str> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(MatchError::Validation(format!("{} is required", field)));
        }

        let length = trimmed.chars().count();
        if length < self.min_brief_chars {
            return Err(MatchError::Validation(format!(
                "{} must be at least {} characters (got {})",
                field, self.min_brief_chars, length
            )));
        }

        Ok(trimmed)
    }

    #[inline]
    pub fn resolve_top_k(&self, top_k: Option<usize>) -> crate::Result<usize> {
        let top_k = top_k.unwrap_or(self.default_top_k);
        if top_k == 0 || top_k > self.max_top_k {
            return Err(MatchError::Validation(format!(
                "top_k must be between 1 and {} (got {})",
                self.max_top_k, top_k
            )));
        }
        Ok(top_k)
    }
}

/// Retrieval plus optional fusion, shared across requests
pub struct MatchService {
    retrieval: RetrievalEngine,
    generator: Option<Arc<dyn TextGenerator>>,
    fusion: FusionOptions,
    limits: RequestLimits,
}

impl MatchService {
    #[inline]
    pub fn new(
        retrieval: RetrievalEngine,
        generator: Option<Arc<dyn TextGenerator>>,
        fusion: FusionOptions,
        limits: RequestLimits,
    ) -> Self {
        Self {
            retrieval,
            generator,
            fusion,
            limits,
        }
    }

    /// Wire up the configured embedding and generation providers
    #[inline]
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let embedder = create_provider(config)?;
        let generator = create_generator(config)?;
        Ok(Self::new(
            RetrievalEngine::from_config(config, embedder),
            generator,
            FusionOptions::from_config(config),
            RequestLimits::from_config(config),
        ))
    }

    #[inline]
    pub fn retrieval(&self) -> &RetrievalEngine {
        &self.retrieval
    }

    #[inline]
    pub fn limits(&self) -> RequestLimits {
        self.limits
    }

    #[inline]
    pub async fn retrieve(&self, request: &RetrieveRequest) -> crate::Result<RetrieveResponse> {
        let query = self.limits.validate_text("query", &request.query)?;
        let top_k = self.limits.resolve_top_k(request.top_k)?;

        let retrieval = self.retrieval.search(query, top_k).await?;
        info!(
            "Retrieve request answered with {} candidates ({} warnings)",
            retrieval.candidates.len(),
            retrieval.warnings.len()
        );

        Ok(RetrieveResponse {
            candidates: retrieval.candidates,
            warnings: retrieval.warnings,
        })
    }

    /// Retrieve candidates for the brief, then ask the generator to justify
    /// and extend them
    #[inline]
    pub async fn generate(&self, request: &GenerateRequest) -> crate::Result<GenerateResponse> {
        let brief = self.limits.validate_text("brief", &request.brief)?;
        let top_k = self.limits.resolve_top_k(request.top_k)?;

        let retrieval = self.retrieval.search(brief, top_k).await?;
        let mut warnings = retrieval.warnings;

        let generated_segments = match &self.generator {
            None if request.require_generation => {
                return Err(MatchError::Config(
                    "generation was required but no generation backend is configured".to_string(),
                ));
            }
            None => {
                warnings.push(StageWarning::GenerationDisabled);
                Vec::new()
            }
            Some(generator) => {
                match augment(
                    brief,
                    &retrieval.candidates,
                    generator.as_ref(),
                    &self.fusion,
                )
                .await
                {
                    Ok(segments) => segments,
                    Err(e) if request.require_generation => return Err(e),
                    Err(e) => {
                        let Some(warning) = StageWarning::from_error(&e) else {
                            return Err(e);
                        };
                        warn!("Generation degraded: {}", warning);
                        warnings.push(warning);
                        Vec::new()
                    }
                }
            }
        };

        info!(
            "Generate request answered with {} candidates and {} segments ({} warnings)",
            retrieval.candidates.len(),
            generated_segments.len(),
            warnings.len()
        );

        Ok(GenerateResponse {
            candidates: retrieval.candidates,
            generated_segments,
            warnings,
        })
    }
}
