//! Keyword-overlap reranking for candidate tags.

use crate::models::CandidateTag;
use crate::normalize::{normalize, tag_tokens};

/// Bonus added per tag token found in the keyword text.
pub const KEYWORD_BONUS: f64 = 0.03;

/// Ceiling applied after the bonus.
pub const MAX_SCORE: f64 = 0.99;

/// Boost candidates whose slug tokens appear in the keyword text, then
/// sort, dedupe and truncate.
///
/// `newScore = min(0.99, base + 0.03 × matching tokens)`. The sort is stable,
/// so equal scores keep their input order; duplicates keep the first
/// (highest ranked) occurrence. `top_n` below 1 is treated as 1.
pub fn rerank_by_keywords(
    candidates: &[CandidateTag],
    keywords: &[String],
    top_n: usize,
) -> Vec<CandidateTag> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let n = top_n.max(1);
    let keyword_text = normalize(&keywords.join(" "));

    let mut rescored: Vec<CandidateTag> = candidates
        .iter()
        .map(|c| {
            let hits = tag_tokens(&c.tag)
                .iter()
                .filter(|t| keyword_text.contains(t.as_str()))
                .count();
            let score = (c.score + KEYWORD_BONUS * hits as f64).min(MAX_SCORE);
            CandidateTag::new(c.tag.clone(), score)
        })
        .collect();

    rescored.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut out: Vec<CandidateTag> = Vec::with_capacity(n.min(rescored.len()));
    for c in rescored {
        if out.iter().any(|o| o.tag == c.tag) {
            continue;
        }
        out.push(c);
        if out.len() == n {
            break;
        }
    }
    out
}
