//! Constrained generation: ask a language model to choose from a closed list.
//!
//! The [`ChatBackend`] trait is the transport seam: one instruction message
//! in, the assistant's text out. Concrete backends (HTTP chat-completions)
//! live in the `shelfmark` app crate; [`DisabledBackend`] is used when no
//! model is configured.
//!
//! [`ConstrainedGenerator`] wraps a backend with the safety contract:
//!
//! - every returned tag is an exact member of the allowed list, deduped
//!   first-seen-wins, at most `top_n` long;
//! - it never fails: a disabled backend, transport error, timeout, malformed
//!   or empty reply all degrade to [`lexical_fallback`];
//! - a suggested candidate id is only accepted after checking it against
//!   the caller's candidate set.
//!
//! Model output is advisory. Correctness never depends on it.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::normalize::{normalize, overlap_score};

/// Transport to an external language model.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Model identifier sent with each request.
    fn model_name(&self) -> &str;

    /// Whether requests should be attempted at all.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Send a single user message and return the assistant's content.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Backend used when no model is configured. Always reports disabled.
pub struct DisabledBackend;

#[async_trait]
impl ChatBackend for DisabledBackend {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("language model is disabled")
    }
}

/// Anything that can pick tags from an allowed list.
///
/// Implementations must only return members of `allowed`; callers still
/// re-check membership.
#[async_trait]
pub trait TagSelector: Send + Sync {
    async fn constrained_tags(&self, context: &str, allowed: &[String], top_n: usize)
        -> Vec<String>;
}

/// One option offered to [`ConstrainedGenerator::rerank_by_candidates`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankCandidate {
    pub id: String,
    pub category: String,
    pub tags: Vec<String>,
    pub rule_score: f64,
}

/// Result of asking the model to pick one candidate.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankOutcome {
    /// A request was sent to the model.
    pub called: bool,
    /// The reply named an id from the candidate set.
    pub valid: bool,
    pub best_candidate_id: Option<String>,
    /// Raw assistant content, for diagnostics.
    pub raw: Option<String>,
}

#[derive(Deserialize)]
struct TagsReply {
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct BestCandidateReply {
    best_candidate_id: String,
}

/// Safety wrapper around a [`ChatBackend`].
pub struct ConstrainedGenerator {
    backend: Arc<dyn ChatBackend>,
}

impl ConstrainedGenerator {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// A generator that never calls out and always uses the lexical fallback.
    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledBackend))
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_enabled()
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Pick up to `top_n` tags from `allowed` for the given context text.
    pub async fn select_tags(&self, context: &str, allowed: &[String], top_n: usize) -> Vec<String> {
        if allowed.is_empty() {
            return Vec::new();
        }
        let n = top_n.max(1);

        if !self.backend.is_enabled() {
            return lexical_fallback(context, allowed, n);
        }

        let prompt = tags_prompt(context, allowed, n);
        let content = match self.backend.complete(&prompt).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "tag selection request failed, using lexical fallback");
                return lexical_fallback(context, allowed, n);
            }
        };

        let reply: TagsReply = match parse_reply(&content) {
            Some(r) => r,
            None => {
                warn!("tag selection reply had unexpected shape, using lexical fallback");
                return lexical_fallback(context, allowed, n);
            }
        };

        let picked = filter_allowed(reply.tags, allowed, n);
        if picked.is_empty() {
            debug!("model picked no allowed tags, using lexical fallback");
            return lexical_fallback(context, allowed, n);
        }
        picked
    }

    /// Ask the model to choose exactly one candidate id.
    ///
    /// The returned id is accepted only when it belongs to `candidates`;
    /// anything else leaves `valid = false`.
    pub async fn rerank_by_candidates(
        &self,
        title: &str,
        author: &str,
        candidates: &[RerankCandidate],
    ) -> RerankOutcome {
        let mut outcome = RerankOutcome::default();
        if !self.backend.is_enabled() || candidates.is_empty() {
            return outcome;
        }
        outcome.called = true;

        let prompt = match candidates_prompt(title, author, candidates) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "could not encode rerank candidates");
                return outcome;
            }
        };
        let content = match self.backend.complete(&prompt).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "candidate rerank request failed");
                return outcome;
            }
        };
        outcome.raw = Some(content.clone());

        let Some(reply) = parse_reply::<BestCandidateReply>(&content) else {
            return outcome;
        };
        let best = reply.best_candidate_id.trim();
        if best.is_empty() {
            return outcome;
        }
        if candidates.iter().any(|c| c.id == best) {
            outcome.best_candidate_id = Some(best.to_string());
            outcome.valid = true;
        } else {
            warn!(suggested = best, "model suggested a candidate outside the set");
        }
        outcome
    }
}

#[async_trait]
impl TagSelector for ConstrainedGenerator {
    async fn constrained_tags(
        &self,
        context: &str,
        allowed: &[String],
        top_n: usize,
    ) -> Vec<String> {
        self.select_tags(context, allowed, top_n).await
    }
}

/// Rank `allowed` by descending token overlap with the normalized context,
/// keeping the original order for ties, and take the first `n`.
pub fn lexical_fallback(context: &str, allowed: &[String], n: usize) -> Vec<String> {
    let q = normalize(context);
    let mut scored: Vec<(usize, &String)> = allowed
        .iter()
        .map(|t| (overlap_score(&q, &normalize(t)), t))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(n).map(|(_, t)| t.clone()).collect()
}

/// Keep exact members of `allowed`, first occurrence wins, at most `n`.
pub fn filter_allowed(tags: Vec<String>, allowed: &[String], n: usize) -> Vec<String> {
    let allow: HashSet<&str> = allowed.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| allow.contains(t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .take(n)
        .collect()
}

/// Instruction for the tag selection request.
pub fn tags_prompt(context: &str, allowed: &[String], n: usize) -> String {
    let allowed_json = serde_json::to_string(allowed).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Select at most {n} tags for the catalog item below.\n\
         Constraints:\n\
         - Every tag MUST be copied exactly from allowed_tags.\n\
         - Never create a tag that is not in allowed_tags.\n\
         - Reply with JSON only, in the form {{\"tags\":[\"tag-a\",\"tag-b\"]}}.\n\
         \n\
         item: {context}\n\
         allowed_tags: {allowed_json}\n",
        n = n,
        context = context.trim(),
        allowed_json = allowed_json,
    )
}

fn candidates_prompt(title: &str, author: &str, candidates: &[RerankCandidate]) -> Result<String> {
    let candidates_json = serde_json::to_string(candidates)?;
    Ok(format!(
        "Pick the single best candidate for the catalog item below.\n\
         Constraints:\n\
         - best_candidate_id MUST be one of the candidate ids.\n\
         - Never invent categories, tags or ids.\n\
         - Reply with JSON only, in the form {{\"best_candidate_id\":\"C1\",\"reason\":\"...\"}}.\n\
         \n\
         title: {title}\n\
         author: {author}\n\
         candidates: {candidates_json}\n",
        title = title.trim(),
        author = author.trim(),
        candidates_json = candidates_json,
    ))
}

/// Parse a structured reply, tolerating code fences or surrounding prose
/// around a single JSON object.
fn parse_reply<T: for<'de> Deserialize<'de>>(content: &str) -> Option<T> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str::<T>(trimmed) {
        return Some(v);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<T>(&trimmed[start..=end]).ok()
}
