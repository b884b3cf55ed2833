// Fusion module
// Turns retrieved candidates into a generation prompt and parses the reply


pub mod parser;

use std::time::Duration;

use itertools::Itertools;
use tracing::{debug, info};

use crate::config::Config;
use crate::generation::TextGenerator;
use crate::retrieval::Candidate;
use crate::{MatchError, Stage};

pub use parser::{
    GeneratedSegment, MAX_KEYWORDS, ParsedReport, REPORT_SEPARATOR, parse_generated_segments,
    parse_ranked_listing, parse_report, render_generated_segments, render_ranked_listing,
    render_report,
};

const SYSTEM_PROMPT: &str = "\
You are an advertising audience strategist. Given a campaign brief and the \
catalog segments that matched it, propose target audience segments for the campaign.

Format every proposed segment exactly like this:

**Segment 1: <segment name>**
**Why it fits:** <one or two sentences tying the segment to the brief>
**Keywords:** <keyword>, <keyword>, <keyword>

Give at most 10 keywords per segment, separated by commas. \
Write the names, reasons and keywords in the language of the brief.";

/// Generation request for one brief
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusionOptions {
    /// Segments the model is asked to propose
    pub segment_count: usize,
    /// Leading candidates summarized in the prompt
    pub prompt_candidates: usize,
    pub timeout: Duration,
}

impl Default for FusionOptions {
    #[inline]
    fn default() -> Self {
        Self {
            segment_count: 5,
            prompt_candidates: 5,
            timeout: Duration::from_secs(30),
        }
    }
}

impl FusionOptions {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            segment_count: config.generation.segment_count,
            prompt_candidates: config.generation.prompt_candidates,
            timeout: config.provider_timeout(),
        }
    }
}

/// Prompt carrying `brief` and a `name (match X%)` line for each of the
/// first `options.prompt_candidates` candidates
#[inline]
pub fn build_prompt(brief: &str, candidates: &[Candidate], options: &FusionOptions) -> Prompt {
    let summary = if candidates.is_empty() {
        "No catalog segments matched this brief; rely on the brief alone.\n".to_string()
    } else {
        let lines = candidates
            .iter()
            .take(options.prompt_candidates)
            .map(|c| format!("- {} (match {:.1}%)", c.name, c.match_percent))
            .join("\n");
        format!("Top matching catalog segments:\n{}\n", lines)
    };

    let user = format!(
        "Campaign brief:\n{}\n\n{}\nPropose {} target segments for this campaign.",
        brief.trim(),
        summary,
        options.segment_count
    );

    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// Ask `generator` to justify and extend `candidates` for `brief` and parse
/// whatever segments the reply contains.
///
/// Provider failures and timeouts are errors here; callers decide whether
/// they are fatal.
#[inline]
pub async fn augment(
    brief: &str,
    candidates: &[Candidate],
    generator: &dyn TextGenerator,
    options: &FusionOptions,
) -> crate::Result<Vec<GeneratedSegment>> {
    let prompt = build_prompt(brief, candidates, options);
    debug!(
        "Generation prompt summarizes {} candidates",
        candidates.len().min(options.prompt_candidates)
    );

    let reply = tokio::time::timeout(
        options.timeout,
        generator.generate(&prompt.system, &prompt.user),
    )
    .await
    .map_err(|_| MatchError::Timeout {
        stage: Stage::Generation,
        after: options.timeout,
    })?
    .map_err(|e| MatchError::Generation(format!("{:#}", e)))?;

    let segments = parse_generated_segments(&reply);
    info!(
        "{} proposed {} segments ({} chars of output)",
        generator.model_name(),
        segments.len(),
        reply.chars().count()
    );

    Ok(segments)
}
