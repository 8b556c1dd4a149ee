//! Core data models used throughout Shelfmark.
//!
//! These types represent the corpus records that seed the mapping cache,
//! the per-request prediction and validation results, and the append-only
//! audit records written by the sync gate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A previously categorized and tagged item from the reference corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub title: String,
    pub author: String,
    /// Taxonomy path, e.g. `"Books ~ Fiction & literature ~ Mystery & thriller"`.
    pub category: String,
    /// Tags in their stored order (raw, not yet slugified).
    pub tags: Vec<String>,
}

/// A tag with its ranking score in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTag {
    pub tag: String,
    pub score: f64,
}

impl CandidateTag {
    pub fn new(tag: impl Into<String>, score: f64) -> Self {
        Self {
            tag: tag.into(),
            score,
        }
    }
}

/// Which tier of the prediction procedure produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Strategy {
    Exact,
    Rule,
    Llm,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Exact => "EXACT",
            Strategy::Rule => "RULE",
            Strategy::Llm => "LLM",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single prediction request. Never persisted.
///
/// Serializes to the `POST /api/v1/predict` response shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub strategy: Strategy,
    pub category: String,
    pub tags: Vec<CandidateTag>,
    pub confidence: f64,
    #[serde(rename = "reason")]
    pub rationale: String,
    /// Always true: every category and tag originates from the corpus.
    pub allowed: bool,
    pub selected_by: Strategy,
    pub llm_called: bool,
    pub llm_effective: bool,
}

/// Severity of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IssueLevel {
    Error,
    Warn,
    Ok,
}

/// One finding for one field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub field_path: String,
    pub level: IssueLevel,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field_path: &str, level: IssueLevel, message: impl Into<String>) -> Self {
        Self {
            field_path: field_path.to_string(),
            level,
            message: message.into(),
        }
    }
}

/// Aggregate result of one validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True iff no issue has level [`IssueLevel::Error`].
    pub pass: bool,
    /// Number of rule groups evaluated.
    pub total: usize,
    /// Number of issues that are not [`IssueLevel::Ok`].
    pub failed: usize,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Issues recorded for a given field path.
    pub fn issues_for<'a>(&'a self, field_path: &'a str) -> impl Iterator<Item = &'a ValidationIssue> {
        self.issues.iter().filter(move |i| i.field_path == field_path)
    }

    /// Number of issues with level [`IssueLevel::Error`].
    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.level == IssueLevel::Error)
            .count()
    }
}

/// Final outcome of a commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncOutcome {
    Success,
    Failed,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Success => "SUCCESS",
            SyncOutcome::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(SyncOutcome::Success),
            "FAILED" => Some(SyncOutcome::Failed),
            _ => None,
        }
    }
}

/// Audit entry for a commit attempt, before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncAttempt {
    pub account_id: i64,
    pub product_id: String,
    pub title: Option<String>,
    pub outcome: SyncOutcome,
    pub message: String,
    pub payload_json: String,
    pub response_json: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A persisted audit entry. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAttemptRecord {
    pub id: i64,
    pub account_id: i64,
    pub product_id: String,
    pub title: Option<String>,
    #[serde(rename = "status")]
    pub outcome: SyncOutcome,
    pub message: String,
    pub payload_json: String,
    pub response_json: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SyncAttemptRecord {
    pub fn from_new(id: i64, new: NewSyncAttempt) -> Self {
        Self {
            id,
            account_id: new.account_id,
            product_id: new.product_id,
            title: new.title,
            outcome: new.outcome,
            message: new.message,
            payload_json: new.payload_json,
            response_json: new.response_json,
            created_at: new.created_at,
        }
    }
}

/// A row of the category reference directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryEntry {
    pub category_id: i64,
    pub category: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_result_serializes_wire_names() {
        let r = PredictionResult {
            strategy: Strategy::Rule,
            category: "Fiction".into(),
            tags: vec![CandidateTag::new("adventure", 0.62)],
            confidence: 0.62,
            rationale: "mapping only".into(),
            allowed: true,
            selected_by: Strategy::Rule,
            llm_called: false,
            llm_effective: false,
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["strategy"], "RULE");
        assert_eq!(v["reason"], "mapping only");
        assert_eq!(v["selectedBy"], "RULE");
        assert_eq!(v["llmCalled"], false);
        assert_eq!(v["tags"][0]["tag"], "adventure");
    }

    #[test]
    fn test_sync_outcome_parse() {
        assert_eq!(SyncOutcome::parse("SUCCESS"), Some(SyncOutcome::Success));
        assert_eq!(SyncOutcome::parse("FAILED"), Some(SyncOutcome::Failed));
        assert_eq!(SyncOutcome::parse("ok"), None);
    }
}
