//! Three-tier category and tag prediction.
//!
//! A request walks the tiers in order and stops at the first that applies:
//!
//! 1. **Exact**: a corpus record whose normalized title and author both
//!    match. Its category and stored tags are returned as-is.
//! 2. **Unmapped**: the mapping cache is still empty after a lazy rebuild.
//!    A configured fallback category and placeholder tag are returned.
//! 3. **Untagged**: the selected category has no tags in the mapping.
//! 4. **Rule**: tags are taken from the mapping in stored order.
//! 5. **Llm**: the mapping's tags are offered to a [`TagSelector`]; the
//!    reply is re-filtered against the allowed set and reranked. An empty
//!    result after filtering drops back to the rule tier.
//!
//! [`Predictor::resolve`] picks the tier; [`Tier::into_result`] turns it into
//! a [`PredictionResult`]. Every confidence value is a fixed constant per
//! tier, so identical inputs against an identical corpus always produce
//! identical output (given a deterministic selector).

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::error::{ShelfError, ShelfResult};
use crate::generation::TagSelector;
use crate::mapping::MappingCache;
use crate::models::{CandidateTag, CorpusRecord, PredictionResult, Strategy};
use crate::normalize::{keywords, normalize};
use crate::rerank::rerank_by_keywords;
use crate::store::CorpusStore;

pub const DEFAULT_TOP_K: usize = 5;

const EXACT_SCORE: f64 = 0.95;
const UNMAPPED_CONFIDENCE: f64 = 0.50;
const UNTAGGED_RULE_CONFIDENCE: f64 = 0.55;
const UNTAGGED_LLM_CONFIDENCE: f64 = 0.60;

const RULE_START: f64 = 0.62;
const RULE_STEP: f64 = 0.06;
const RULE_FLOOR: f64 = 0.40;

const LLM_START: f64 = 0.72;
const LLM_STEP: f64 = 0.04;
const LLM_FLOOR: f64 = 0.10;
const LLM_CONFIDENCE: f64 = 0.70;

/// Input to [`Predictor::predict`]. Matches the `POST /api/v1/predict` body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default, rename = "useAI", alias = "useAi")]
    pub use_ai: Option<bool>,
}

impl PredictRequest {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            author: Some(author.into()),
            ..Default::default()
        }
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    pub fn use_ai(mut self, on: bool) -> Self {
        self.use_ai = Some(on);
        self
    }
}

/// Literals used when the corpus has nothing to offer.
#[derive(Debug, Clone)]
pub struct PredictDefaults {
    pub top_k: usize,
    pub fallback_category: String,
    pub placeholder_tag: String,
}

impl Default for PredictDefaults {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            fallback_category: "Books ~ Non-fiction ~ Other".to_string(),
            placeholder_tag: "tm-nf-other".to_string(),
        }
    }
}

/// The branch a prediction request ended up in.
#[derive(Debug, Clone, PartialEq)]
pub enum Tier {
    Exact {
        record: CorpusRecord,
    },
    Unmapped,
    Untagged {
        category: String,
        llm_requested: bool,
    },
    Rule {
        category: String,
        tags: Vec<String>,
        after_llm: bool,
    },
    Llm {
        category: String,
        tags: Vec<CandidateTag>,
    },
}

impl Tier {
    /// Produce the response for this tier.
    pub fn into_result(self, defaults: &PredictDefaults, top_k: usize) -> PredictionResult {
        match self {
            Tier::Exact { record } => {
                let category = if record.category.trim().is_empty() {
                    defaults.fallback_category.clone()
                } else {
                    record.category
                };
                let tags = record
                    .tags
                    .into_iter()
                    .filter(|t| !t.trim().is_empty())
                    .take(top_k)
                    .map(|t| CandidateTag::new(t, EXACT_SCORE))
                    .collect();
                result(Strategy::Exact, category, tags, EXACT_SCORE, "exact corpus match", false)
            }
            Tier::Unmapped => result(
                Strategy::Rule,
                defaults.fallback_category.clone(),
                vec![CandidateTag::new(
                    defaults.placeholder_tag.clone(),
                    UNMAPPED_CONFIDENCE,
                )],
                UNMAPPED_CONFIDENCE,
                "no category mapping available; using fallback category",
                false,
            ),
            Tier::Untagged {
                category,
                llm_requested,
            } => {
                let (strategy, confidence) = if llm_requested {
                    (Strategy::Llm, UNTAGGED_LLM_CONFIDENCE)
                } else {
                    (Strategy::Rule, UNTAGGED_RULE_CONFIDENCE)
                };
                result(strategy, category, Vec::new(), confidence, "no mapped tags", false)
            }
            Tier::Rule {
                category,
                tags,
                after_llm,
            } => {
                let scored = descending_scores(&tags, top_k, RULE_START, RULE_STEP, RULE_FLOOR);
                let reason = if after_llm {
                    "language model returned no allowed tag; fell back to mapping order"
                } else {
                    "category and tags selected from existing mapping"
                };
                result(Strategy::Rule, category, scored, RULE_START, reason, after_llm)
            }
            Tier::Llm { category, tags } => {
                let mut r = result(
                    Strategy::Llm,
                    category,
                    tags,
                    LLM_CONFIDENCE,
                    "category from mapping; tags chosen by language model from allowed set",
                    true,
                );
                r.llm_effective = true;
                r
            }
        }
    }
}

fn result(
    strategy: Strategy,
    category: String,
    tags: Vec<CandidateTag>,
    confidence: f64,
    rationale: &str,
    llm_called: bool,
) -> PredictionResult {
    PredictionResult {
        strategy,
        category,
        tags,
        confidence,
        rationale: rationale.to_string(),
        allowed: true,
        selected_by: strategy,
        llm_called,
        llm_effective: false,
    }
}

/// Score `tags[i]` as `max(floor, start - i * step)` for the first `n` tags.
fn descending_scores(tags: &[String], n: usize, start: f64, step: f64, floor: f64) -> Vec<CandidateTag> {
    tags.iter()
        .take(n)
        .enumerate()
        .map(|(i, t)| CandidateTag::new(t.clone(), (start - i as f64 * step).max(floor)))
        .collect()
}

/// Prediction service. Cheap to share behind an `Arc`.
pub struct Predictor {
    corpus: Arc<dyn CorpusStore>,
    cache: Arc<MappingCache>,
    selector: Arc<dyn TagSelector>,
    defaults: PredictDefaults,
}

impl Predictor {
    pub fn new(
        corpus: Arc<dyn CorpusStore>,
        cache: Arc<MappingCache>,
        selector: Arc<dyn TagSelector>,
        defaults: PredictDefaults,
    ) -> Self {
        Self {
            corpus,
            cache,
            selector,
            defaults,
        }
    }

    pub fn cache(&self) -> &Arc<MappingCache> {
        &self.cache
    }

    /// Run the full procedure for one request.
    ///
    /// Rejects a request whose title and author are both blank. Storage
    /// failures propagate; language model failures never do.
    pub async fn predict(&self, req: &PredictRequest) -> ShelfResult<PredictionResult> {
        let top_k = req.top_k.unwrap_or(self.defaults.top_k).max(1);
        let tier = self.resolve(req, top_k).await?;
        debug!(?tier, "prediction tier resolved");
        Ok(tier.into_result(&self.defaults, top_k))
    }

    /// Decide which tier answers the request.
    pub async fn resolve(&self, req: &PredictRequest, top_k: usize) -> ShelfResult<Tier> {
        let title = req.title.as_deref().unwrap_or("");
        let author = req.author.as_deref().unwrap_or("");
        if title.trim().is_empty() && author.trim().is_empty() {
            return Err(ShelfError::input("title or author is required"));
        }
        let use_ai = req.use_ai.unwrap_or(false);

        let title_norm = normalize(title);
        let author_norm = normalize(author);
        if let Some(record) = self.corpus.find_exact(&title_norm, &author_norm).await? {
            return Ok(Tier::Exact { record });
        }

        let mut snapshot = self.cache.snapshot();
        if !snapshot.is_loaded() {
            snapshot = self.cache.rebuild(self.corpus.as_ref()).await?;
        }

        let query = normalize(&format!("{} {}", title, author));
        let Some(category) = snapshot.select_for_query(&query).map(str::to_string) else {
            return Ok(Tier::Unmapped);
        };

        let universe = snapshot.tags_for(&category).to_vec();
        if universe.is_empty() {
            return Ok(Tier::Untagged {
                category,
                llm_requested: use_ai,
            });
        }

        if !use_ai {
            return Ok(Tier::Rule {
                category,
                tags: universe,
                after_llm: false,
            });
        }

        // Nothing past the allowed set can be returned.
        let top_k = top_k.min(universe.len());
        let context = format!("{} {}", title, author);
        let picked = self
            .selector
            .constrained_tags(&context, &universe, top_k)
            .await;
        let safe = sanitize(picked, &universe, top_k);
        if safe.is_empty() {
            return Ok(Tier::Rule {
                category,
                tags: universe,
                after_llm: true,
            });
        }

        let base = descending_scores(&safe, top_k, LLM_START, LLM_STEP, LLM_FLOOR);
        let ranked = rerank_by_keywords(&base, &keywords(title, author), top_k);
        Ok(Tier::Llm {
            category,
            tags: ranked,
        })
    }
}

/// Intersect with the allowed set, dedupe first-seen-wins, truncate.
fn sanitize(picked: Vec<String>, allowed: &[String], n: usize) -> Vec<String> {
    let allow: HashSet<&str> = allowed.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    picked
        .into_iter()
        .filter(|t| allow.contains(t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .take(n)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ConstrainedGenerator;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;

    struct Fixed(Vec<&'static str>);

    #[async_trait]
    impl TagSelector for Fixed {
        async fn constrained_tags(&self, _: &str, _: &[String], _: usize) -> Vec<String> {
            self.0.iter().map(|s| s.to_string()).collect()
        }
    }

    fn rec(title: &str, author: &str, category: &str, tags: &[&str]) -> CorpusRecord {
        CorpusRecord {
            title: title.into(),
            author: author.into(),
            category: category.into(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn predictor(records: Vec<CorpusRecord>, selector: Arc<dyn TagSelector>) -> Predictor {
        Predictor::new(
            Arc::new(InMemoryStore::with_records(records)),
            Arc::new(MappingCache::new()),
            selector,
            PredictDefaults::default(),
        )
    }

    fn fiction_corpus() -> Vec<CorpusRecord> {
        vec![rec(
            "Some Other Story",
            "Someone",
            "Fiction",
            &["adventure", "fiction", "travel", "mystery"],
        )]
    }

    fn tags(r: &PredictionResult) -> Vec<(&str, f64)> {
        r.tags.iter().map(|t| (t.tag.as_str(), t.score)).collect()
    }

    fn close(a: &[(&str, f64)], b: &[(&str, f64)]) -> bool {
        a.len() == b.len()
            && a.iter()
                .zip(b)
                .all(|(x, y)| x.0 == y.0 && (x.1 - y.1).abs() < 1e-9)
    }

    #[tokio::test]
    async fn test_rule_tier_worked_example() {
        let p = predictor(fiction_corpus(), Arc::new(ConstrainedGenerator::disabled()));
        let r = p
            .predict(&PredictRequest::new("The Great Adventure", "Jane Doe").top_k(3))
            .await
            .unwrap();
        assert_eq!(r.strategy, Strategy::Rule);
        assert_eq!(r.category, "Fiction");
        assert!(close(
            &tags(&r),
            &[("adventure", 0.62), ("fiction", 0.56), ("travel", 0.50)]
        ));
        assert_eq!(r.confidence, 0.62);
        assert!(!r.llm_called);
    }

    #[tokio::test]
    async fn test_exact_match_short_circuits() {
        let corpus = vec![rec(
            "The TranzAlpine Express",
            "Roy Sinclair",
            "Books ~ Non-fiction ~ Transport ~ Rail",
            &["rail", "", "new-zealand", "transport"],
        )];
        let p = predictor(corpus, Arc::new(Fixed(vec!["never"])));
        let r = p
            .predict(
                &PredictRequest::new("the tranzalpine express!", "ROY  SINCLAIR")
                    .top_k(2)
                    .use_ai(true),
            )
            .await
            .unwrap();
        assert_eq!(r.strategy, Strategy::Exact);
        assert_eq!(r.category, "Books ~ Non-fiction ~ Transport ~ Rail");
        assert!(close(&tags(&r), &[("rail", 0.95), ("new-zealand", 0.95)]));
        assert!(!r.llm_called);
    }

    #[tokio::test]
    async fn test_exact_blank_category_uses_fallback() {
        let p = predictor(
            vec![rec("Orphan", "Nobody", "  ", &["x"])],
            Arc::new(ConstrainedGenerator::disabled()),
        );
        let r = p.predict(&PredictRequest::new("Orphan", "Nobody")).await.unwrap();
        assert_eq!(r.strategy, Strategy::Exact);
        assert_eq!(r.category, "Books ~ Non-fiction ~ Other");
    }

    #[tokio::test]
    async fn test_empty_mapping_returns_placeholder() {
        let p = predictor(Vec::new(), Arc::new(ConstrainedGenerator::disabled()));
        let r = p.predict(&PredictRequest::new("Anything", "")).await.unwrap();
        assert_eq!(r.strategy, Strategy::Rule);
        assert_eq!(r.category, "Books ~ Non-fiction ~ Other");
        assert!(close(&tags(&r), &[("tm-nf-other", 0.50)]));
        assert_eq!(r.confidence, 0.50);
    }

    #[tokio::test]
    async fn test_untagged_category_confidence_depends_on_request() {
        // Tags that slugify to nothing register the category with no tags.
        let p = predictor(
            vec![rec("x", "y", "Poetry", &["!!!"])],
            Arc::new(ConstrainedGenerator::disabled()),
        );
        let r = p.predict(&PredictRequest::new("Odes", "Keats")).await.unwrap();
        assert_eq!((r.strategy, r.confidence), (Strategy::Rule, 0.55));
        assert!(r.tags.is_empty());

        let r = p
            .predict(&PredictRequest::new("Odes", "Keats").use_ai(true))
            .await
            .unwrap();
        assert_eq!((r.strategy, r.confidence), (Strategy::Llm, 0.60));
        assert_eq!(r.rationale, "no mapped tags");
    }

    #[tokio::test]
    async fn test_llm_reply_outside_allowed_set_degrades_to_rule() {
        let p = predictor(fiction_corpus(), Arc::new(Fixed(vec!["invented", "also-invented"])));
        let r = p
            .predict(&PredictRequest::new("The Great Adventure", "Jane Doe").top_k(2).use_ai(true))
            .await
            .unwrap();
        assert_eq!(r.strategy, Strategy::Rule);
        assert_eq!(r.confidence, 0.62);
        assert!(close(&tags(&r), &[("adventure", 0.62), ("fiction", 0.56)]));
        assert!(r.llm_called);
        assert!(!r.llm_effective);
    }

    #[tokio::test]
    async fn test_llm_tier_filters_and_reranks() {
        let p = predictor(
            fiction_corpus(),
            Arc::new(Fixed(vec!["mystery", "invented", "travel", "mystery", "fiction"])),
        );
        let r = p
            .predict(
                &PredictRequest::new("A Travel Mystery", "Jane Doe")
                    .top_k(2)
                    .use_ai(true),
            )
            .await
            .unwrap();
        assert_eq!(r.strategy, Strategy::Llm);
        assert_eq!(r.confidence, 0.70);
        assert!(r.llm_called && r.llm_effective);
        // mystery 0.72 + 0.03, travel 0.68 + 0.03
        assert!(close(&tags(&r), &[("mystery", 0.75), ("travel", 0.71)]));
        assert!(r.tags.iter().all(|t| t.tag != "invented"));
    }

    #[tokio::test]
    async fn test_huge_top_k_is_bounded_by_allowed_tags() {
        let p = predictor(
            fiction_corpus(),
            Arc::new(Fixed(vec!["travel", "mystery", "adventure", "fiction"])),
        );
        let r = p
            .predict(
                &PredictRequest::new("The Great Adventure", "Jane Doe")
                    .top_k(usize::MAX)
                    .use_ai(true),
            )
            .await
            .unwrap();
        assert_eq!(r.strategy, Strategy::Llm);
        assert_eq!(r.tags.len(), 4);

        let r = p
            .predict(&PredictRequest::new("The Great Adventure", "Jane Doe").top_k(usize::MAX))
            .await
            .unwrap();
        assert_eq!(r.strategy, Strategy::Rule);
        assert_eq!(r.tags.len(), 4);
    }

    #[tokio::test]
    async fn test_blank_request_rejected() {
        let p = predictor(fiction_corpus(), Arc::new(ConstrainedGenerator::disabled()));
        let err = p.predict(&PredictRequest::new("  ", "")).await.unwrap_err();
        assert!(err.is_input());
    }

    #[tokio::test]
    async fn test_every_record_predicts_exact() {
        let corpus = vec![
            rec("Pacific Tides", "Sina Vea", "Books ~ Travel ~ Pacific", &["travel"]),
            rec("Rails of Aotearoa", "M. Hart", "Books ~ Transport ~ Rail", &["rail"]),
        ];
        let p = predictor(corpus.clone(), Arc::new(ConstrainedGenerator::disabled()));
        for r in corpus {
            let out = p
                .predict(&PredictRequest::new(r.title.clone(), r.author.clone()))
                .await
                .unwrap();
            assert_eq!(out.strategy, Strategy::Exact);
            assert_eq!(out.category, r.category);
        }
    }

    #[test]
    fn test_request_wire_names() {
        let req: PredictRequest =
            serde_json::from_str(r#"{"title":"t","author":"a","topK":3,"useAI":true}"#).unwrap();
        assert_eq!(req.top_k, Some(3));
        assert_eq!(req.use_ai, Some(true));
    }
}
