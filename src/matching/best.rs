use crate::docx::text::ParagraphIndex;

use super::fuzz::partial_ratio;
use super::normalize::collapse_whitespace;

pub const MATCH_METHOD: &str = "partial_ratio";

#[derive(Clone, Debug, PartialEq)]
pub struct MatchResult {
    /// `None` when no paragraph matched. `score` then still holds the best score seen.
    pub paragraph_index: Option<usize>,
    pub score: f64,
    pub method: &'static str,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self {
            paragraph_index: None,
            score: 0.0,
            method: MATCH_METHOD,
        }
    }
}

/// Highest-scoring paragraph for `anchor`, first one winning ties.
///
/// The anchor only gets whitespace trimmed and collapsed; paragraph text is scored raw.
/// Blank paragraphs are never candidates, and a best score below `min_score` (or of zero)
/// counts as no match while keeping that score.
pub fn best_paragraph(anchor: &str, index: &ParagraphIndex, min_score: f64) -> MatchResult {
    let anchor = collapse_whitespace(anchor);
    if anchor.is_empty() {
        return MatchResult::no_match();
    }
    let mut best: Option<(usize, f64)> = None;
    for (i, p) in index.iter().enumerate() {
        if p.text.trim().is_empty() {
            continue;
        }
        let s = partial_ratio(&anchor, &p.text);
        if best.map_or(true, |(_, b)| s > b) {
            best = Some((i, s));
        }
        if s >= 100.0 {
            break;
        }
    }
    match best {
        Some((i, s)) if s > 0.0 && s >= min_score => MatchResult {
            paragraph_index: Some(i),
            score: s,
            method: MATCH_METHOD,
        },
        Some((_, s)) => MatchResult {
            paragraph_index: None,
            score: s,
            method: MATCH_METHOD,
        },
        None => MatchResult::no_match(),
    }
}
