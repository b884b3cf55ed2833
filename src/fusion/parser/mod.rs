// Tolerant parsers for model output and the plain-text report format.
//
// Model replies drift in format, so each step here (block splitting, name,
// labeled sections, keyword lists) is a separate function that accepts
// whatever it recognizes and ignores the rest.


use std::fmt;
use std::sync::LazyLock;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::retrieval::Candidate;

pub const MAX_KEYWORDS: usize = 10;

/// Heading between the retrieval listing and the proposed segments in a report
pub const REPORT_SEPARATOR: &str = "💡 Proposed Target Segments";

const LISTING_HEADING: &str = "🔎 Retrieved Segments";

/// A segment proposed by the generation model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSegment {
    pub name: String,
    pub why_fits: String,
    pub keywords: Vec<String>,
}

/// Both halves of a rendered report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedReport {
    pub candidates: Vec<Candidate>,
    pub generated_segments: Vec<GeneratedSegment>,
}

/// Which field a labeled section feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionLabel {
    WhyFits,
    Keywords,
    Other,
}

/// Body of one labeled section inside a segment block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section<'a> {
    pub label: SectionLabel,
    pub body: &'a str,
}

// A marker must start a line or follow bold markup, so prose mentioning
// "segment 2:" does not split a block
static SEGMENT_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)(?:^[ \t]*(?:#{1,6}[ \t]*)?(?:\*\*|__)?|\*\*|__)[ \t]*(?:segment|セグメント)[ \t]*\d+[ \t]*[:：]",
    )
    .expect("valid regex")
});

static SECTION_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?im)(?:^[ \t]*(?:[-•·][ \t]+)?(?:\*\*|__)?|\*\*|__)[ \t]*",
        r"(?P<known>why (?:it|this) fits|rationale|reason|key ?words|description|headlines?|理由|キーワード|説明|見出し)",
        r"[ \t]*(?:\*\*|__)?[ \t]*[:：](?:[ \t]*(?:\*\*|__))?",
        r"|\*\*(?P<other>[^*\n:：]{1,40})[:：][ \t]*\*\*",
    ))
    .expect("valid regex")
});

static BULLET_LINE: LazyLock<Regex> = LazyLock::new(|| {
    // `*` needs a following space so `**bold**` lines are not bullets
    Regex::new(r"^[ \t]*(?:[-•·・][ \t]*|\*[ \t]+|\d+[.)][ \t]+)(?P<item>.+)$")
        .expect("valid regex")
});

static LISTING_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\)\s+(?P<name>.+?)\s*$").expect("valid regex"));

static LISTING_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)match:\s*(?P<percent>[\d.]+)\s*%").expect("valid regex")
});

/// Parse every well-formed segment out of a model reply. Never fails; text
/// that cannot be understood is dropped.
#[inline]
pub fn parse_generated_segments(text: &str) -> Vec<GeneratedSegment> {
    let blocks = split_segment_blocks(text);
    let segments: Vec<GeneratedSegment> =
        blocks.iter().filter_map(|block| parse_segment_block(block)).collect();

    debug!(
        "Parsed {} of {} segment blocks",
        segments.len(),
        blocks.len()
    );
    segments
}

/// Text following each `Segment N:` marker. Anything before the first
/// marker is preamble and is dropped.
#[inline]
pub fn split_segment_blocks(text: &str) -> Vec<&str> {
    let markers: Vec<(usize, usize)> = SEGMENT_MARKER
        .find_iter(text)
        .filter_map(Result::ok)
        .map(|m| (m.start(), m.end()))
        .collect();

    markers
        .iter()
        .enumerate()
        .filter_map(|(i, &(_, body_start))| {
            let body_end = markers.get(i + 1).map_or(text.len(), |&(start, _)| start);
            text.get(body_start..body_end)
        })
        .collect()
}

/// One segment from the text after its marker, if it has a name and at
/// least a rationale or keywords
#[inline]
pub fn parse_segment_block(block: &str) -> Option<GeneratedSegment> {
    let name = extract_name(block)?;
    let sections = scan_sections(block);

    let why_fits = sections
        .iter()
        .filter(|section| section.label == SectionLabel::WhyFits)
        .map(|section| clean_section(section.body))
        .find(|body| !body.is_empty())
        .unwrap_or_default();

    let keywords = sections
        .iter()
        .filter(|section| section.label == SectionLabel::Keywords)
        .map(|section| split_keywords(section.body))
        .find(|keywords| !keywords.is_empty())
        .unwrap_or_default();

    if why_fits.is_empty() && keywords.is_empty() {
        debug!("Dropping segment {:?} with no rationale or keywords", name);
        return None;
    }

    Some(GeneratedSegment {
        name,
        why_fits,
        keywords,
    })
}

/// First non-empty line before any labeled section, with markup removed
#[inline]
pub fn extract_name(block: &str) -> Option<String> {
    let head_end = SECTION_LABEL
        .find(block)
        .ok()
        .flatten()
        .map_or(block.len(), |m| m.start());

    block
        .get(..head_end)?
        .lines()
        .map(clean_name)
        .find(|name| !name.is_empty())
}

/// Labeled sections in order of appearance. A section runs until the next
/// label of any kind or the end of the block.
#[inline]
pub fn scan_sections(block: &str) -> Vec<Section<'_>> {
    let labels: Vec<(SectionLabel, usize, usize)> = SECTION_LABEL
        .captures_iter(block)
        .filter_map(Result::ok)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let label = captures
                .name("known")
                .map_or(SectionLabel::Other, |known| classify_label(known.as_str()));
            Some((label, whole.start(), whole.end()))
        })
        .collect();

    labels
        .iter()
        .enumerate()
        .filter_map(|(i, &(label, _, body_start))| {
            let body_end = labels.get(i + 1).map_or(block.len(), |&(_, start, _)| start);
            block
                .get(body_start..body_end)
                .map(|body| Section { label, body })
        })
        .collect()
}

fn classify_label(label: &str) -> SectionLabel {
    let label = label.to_lowercase();
    if label.starts_with("why") || label == "rationale" || label == "reason" || label == "理由" {
        SectionLabel::WhyFits
    } else if label.starts_with("key") || label == "キーワード" {
        SectionLabel::Keywords
    } else {
        SectionLabel::Other
    }
}

/// Keyword list from a section body: comma separated first, bullet lines
/// when that yields at most one item. At most [`MAX_KEYWORDS`] are kept.
#[inline]
pub fn split_keywords(body: &str) -> Vec<String> {
    let body = clean_section(body);

    let comma_separated: Vec<String> = body
        .split([',', '、', '，'])
        .map(clean_keyword)
        .filter(|keyword| !keyword.is_empty())
        .collect();

    let keywords = if comma_separated.len() > 1 {
        comma_separated
    } else {
        let bulleted: Vec<String> = body
            .lines()
            .filter_map(|line| {
                BULLET_LINE
                    .captures(line)
                    .ok()
                    .flatten()
                    .and_then(|captures| captures.name("item"))
                    .map(|item| clean_keyword(item.as_str()))
            })
            .filter(|keyword| !keyword.is_empty())
            .collect();

        if bulleted.is_empty() {
            // A lone token spanning several lines is an unmarked list, not a keyword
            comma_separated
                .into_iter()
                .filter(|keyword| !keyword.contains('\n'))
                .collect()
        } else {
            bulleted
        }
    };

    keywords.into_iter().take(MAX_KEYWORDS).collect()
}

/// Recover candidates from `N) name` lines, each followed directly by a
/// line carrying `match: X%`. Other lines are ignored.
#[inline]
pub fn parse_ranked_listing(text: &str) -> Vec<Candidate> {
    let lines: Vec<&str> = text.lines().collect();

    lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            let name = LISTING_NAME
                .captures(line)
                .ok()
                .flatten()?
                .name("name")?
                .as_str()
                .to_string();

            let percent: f64 = LISTING_SCORE
                .captures(lines.get(i + 1)?)
                .ok()
                .flatten()?
                .name("percent")?
                .as_str()
                .parse()
                .ok()?;

            Some(Candidate {
                name,
                match_percent: percent.clamp(0.0, 100.0),
                keyword: String::new(),
                text: String::new(),
            })
        })
        .collect()
}

/// Listing parsed by [`parse_ranked_listing`]. The `score` column is the
/// cosine recovered from the match percentage.
#[inline]
pub fn render_ranked_listing(candidates: &[Candidate]) -> String {
    RankedListing(candidates).to_string()
}

/// Segments in the format requested from the model
#[inline]
pub fn render_generated_segments(segments: &[GeneratedSegment]) -> String {
    SegmentBlocks(segments).to_string()
}

/// Listing, separator heading, then the proposed segments
#[inline]
pub fn render_report(candidates: &[Candidate], segments: &[GeneratedSegment]) -> String {
    format!(
        "{}\n\n{}\n{}\n\n{}",
        LISTING_HEADING,
        RankedListing(candidates),
        REPORT_SEPARATOR,
        SegmentBlocks(segments)
    )
}

struct RankedListing<'a>(&'a [Candidate]);

impl fmt::Display for RankedListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, candidate) in self.0.iter().enumerate() {
            writeln!(f, "{}) {}", i + 1, candidate.name)?;
            writeln!(
                f,
                "   • score: {:.3}  |  match: {:.1}%",
                cosine_from_percent(candidate.match_percent),
                candidate.match_percent
            )?;
        }
        Ok(())
    }
}

struct SegmentBlocks<'a>(&'a [GeneratedSegment]);

impl fmt::Display for SegmentBlocks<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "**Segment {}: {}**", i + 1, segment.name)?;
            if !segment.why_fits.is_empty() {
                writeln!(f, "**Why it fits:** {}", segment.why_fits)?;
            }
            if !segment.keywords.is_empty() {
                writeln!(f, "**Keywords:** {}", segment.keywords.join(", "))?;
            }
        }
        Ok(())
    }
}

/// Inverse of [`crate::retrieval::match_percent`]
fn cosine_from_percent(match_percent: f64) -> f64 {
    match_percent / 50.0 - 1.0
}

/// Split a report at [`REPORT_SEPARATOR`] and parse both halves. Without the
/// separator the whole text is treated as a listing.
#[inline]
pub fn parse_report(text: &str) -> ParsedReport {
    let (listing, segments) = text
        .split_once(REPORT_SEPARATOR)
        .map_or((text, None), |(listing, segments)| (listing, Some(segments)));

    ParsedReport {
        candidates: parse_ranked_listing(listing),
        generated_segments: segments.map(parse_generated_segments).unwrap_or_default(),
    }
}

fn clean_name(line: &str) -> String {
    line.replace(['*', '#', '`'], "")
        .trim()
        .trim_matches(|c: char| c == '_' || c == '"' || c == '「' || c == '」')
        .trim()
        .to_string()
}

/// Trim a section body and drop horizontal rules and stray bold markers
fn clean_section(body: &str) -> String {
    let lines: Vec<&str> = body
        .lines()
        .filter(|line| !is_horizontal_rule(line))
        .collect();
    lines
        .join("\n")
        .trim()
        .trim_matches('*')
        .trim()
        .to_string()
}

fn is_horizontal_rule(line: &str) -> bool {
    let line = line.trim();
    line.chars().count() >= 3 && line.chars().all(|c| matches!(c, '-' | '*' | '_' | '='))
}

fn clean_keyword(raw: &str) -> String {
    raw.trim()
        .trim_start_matches(['-', '•', '·', '・'])
        .trim()
        .trim_matches(|c: char| matches!(c, '*' | '`' | '"' | '\'' | '「' | '」' | '#'))
        .trim_end_matches(['.', '。'])
        .trim()
        .to_string()
}
