//! Business rules for a proposed product edit.
//!
//! Three rule groups run on every call, each reporting under its own field
//! path:
//!
//! | Field | Rule |
//! |-------|------|
//! | `title` | no whitespace-delimited word longer than `max_word_chars`; whole title at most `max_title_chars` |
//! | `categoryId` | a category id can be resolved and exists in the category directory |
//! | `images` | every measurable image has a longest side of at least `min_image_edge_px` |
//!
//! A group that raises nothing gets an `OK` issue, so every field always
//! has at least one entry. `pass` is false iff some issue is an `ERROR`;
//! warnings never block.
//!
//! When the payload lacks a category id or images, the live product can be
//! fetched from the catalog (once per call) to fill the gap. That fetch is
//! read-only and its failure is treated as "nothing found".

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::catalog::{CatalogClient, CatalogProduct};
use crate::error::ShelfResult;
use crate::models::{IssueLevel, ValidationIssue, ValidationResult};
use crate::payload::{category_ids_in, ImageRef, ProductPayload};
use crate::store::CategoryDirectory;

pub const FIELD_TITLE: &str = "title";
pub const FIELD_CATEGORY: &str = "categoryId";
pub const FIELD_IMAGES: &str = "images";

/// Number of rule groups evaluated per call.
pub const RULE_GROUPS: usize = 3;

/// What to report when no measurable image is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingImages {
    Warn,
    Error,
}

impl MissingImages {
    fn level(self) -> IssueLevel {
        match self {
            MissingImages::Warn => IssueLevel::Warn,
            MissingImages::Error => IssueLevel::Error,
        }
    }
}

/// Tunable thresholds and enrichment behavior.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    pub max_title_chars: usize,
    pub max_word_chars: usize,
    pub min_image_edge_px: i64,
    pub missing_images: MissingImages,
    /// Fetch the live product when the payload omits category or images.
    pub live_enrichment: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            max_title_chars: 200,
            max_word_chars: 20,
            min_image_edge_px: 500,
            missing_images: MissingImages::Warn,
            live_enrichment: true,
        }
    }
}

pub struct Validator {
    directory: Arc<dyn CategoryDirectory>,
    catalog: Arc<dyn CatalogClient>,
    policy: ValidationPolicy,
}

/// Live product state, fetched at most once per validation.
enum Live {
    NotFetched,
    Fetched(Option<CatalogProduct>),
}

impl Validator {
    pub fn new(
        directory: Arc<dyn CategoryDirectory>,
        catalog: Arc<dyn CatalogClient>,
        policy: ValidationPolicy,
    ) -> Self {
        Self {
            directory,
            catalog,
            policy,
        }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Evaluate every rule group. Only directory read failures are errors;
    /// rule violations are reported in the result.
    pub async fn validate(&self, payload: &ProductPayload) -> ShelfResult<ValidationResult> {
        let mut live = Live::NotFetched;
        let mut issues = Vec::new();

        issues.extend(self.check_title(payload.title.as_deref()));
        issues.push(self.check_category(payload, &mut live).await?);
        issues.push(self.check_images(payload, &mut live).await);

        let failed = issues.iter().filter(|i| i.level != IssueLevel::Ok).count();
        let pass = !issues.iter().any(|i| i.level == IssueLevel::Error);
        Ok(ValidationResult {
            pass,
            total: RULE_GROUPS,
            failed,
            issues,
        })
    }

    /// Word-length and total-length checks. Both may fire.
    pub fn check_title(&self, title: Option<&str>) -> Vec<ValidationIssue> {
        let mut out = Vec::new();
        let title = title.unwrap_or("");
        let max_word = self.policy.max_word_chars;
        let max_len = self.policy.max_title_chars;

        if title.split_whitespace().any(|w| w.chars().count() > max_word) {
            out.push(ValidationIssue::new(
                FIELD_TITLE,
                IssueLevel::Error,
                format!(
                    "A single word in the title must not exceed {} characters.",
                    max_word
                ),
            ));
        }
        if title.chars().count() > max_len {
            out.push(ValidationIssue::new(
                FIELD_TITLE,
                IssueLevel::Error,
                format!("Title must not exceed {} characters.", max_len),
            ));
        }
        if out.is_empty() {
            out.push(ValidationIssue::new(FIELD_TITLE, IssueLevel::Ok, "OK"));
        }
        out
    }

    async fn check_category(
        &self,
        payload: &ProductPayload,
        live: &mut Live,
    ) -> ShelfResult<ValidationIssue> {
        let resolved = match payload.category_id {
            Some(id) => Some(id),
            None => match self.pick_known(payload.embedded_category_ids()).await? {
                Some(id) => Some(id),
                None => match self.live_product(payload, live).await {
                    Some(product) => {
                        let ids = category_ids_in(product.tags.iter().map(String::as_str));
                        self.pick_known(ids).await?
                    }
                    None => None,
                },
            },
        };

        let Some(id) = resolved else {
            return Ok(ValidationIssue::new(
                FIELD_CATEGORY,
                IssueLevel::Error,
                "Category id is missing.",
            ));
        };

        Ok(match self.directory.find_path(id).await? {
            Some(path) => ValidationIssue::new(
                FIELD_CATEGORY,
                IssueLevel::Ok,
                format!("Category {} ({})", id, path),
            ),
            None => ValidationIssue::new(
                FIELD_CATEGORY,
                IssueLevel::Error,
                format!("Category {} is not in the category directory.", id),
            ),
        })
    }

    /// The first id present in the directory, else the first id at all.
    async fn pick_known(&self, ids: Vec<i64>) -> ShelfResult<Option<i64>> {
        for id in &ids {
            if self.directory.find_path(*id).await?.is_some() {
                return Ok(Some(*id));
            }
        }
        Ok(ids.first().copied())
    }

    async fn check_images(&self, payload: &ProductPayload, live: &mut Live) -> ValidationIssue {
        let mut images = measurable(payload.all_images());
        if images.is_empty() {
            if let Some(product) = self.live_product(payload, live).await {
                images = measurable(product.images.clone());
            }
        }

        let min = self.policy.min_image_edge_px;
        if images.is_empty() {
            return ValidationIssue::new(
                FIELD_IMAGES,
                self.policy.missing_images.level(),
                "No images found.",
            );
        }
        if images.iter().any(|(w, h)| (*w).max(*h) < min) {
            return ValidationIssue::new(
                FIELD_IMAGES,
                IssueLevel::Error,
                format!("Photos must be at least {} pixels on the longest side", min),
            );
        }
        ValidationIssue::new(FIELD_IMAGES, IssueLevel::Ok, "OK")
    }

    async fn live_product<'a>(
        &self,
        payload: &ProductPayload,
        live: &'a mut Live,
    ) -> Option<&'a CatalogProduct> {
        if let Live::NotFetched = live {
            let fetched = match (payload.account_id, payload.product_ref()) {
                (Some(account), Some(product)) if self.policy.live_enrichment => {
                    match self.catalog.query(account, product).await {
                        Ok(p) => Some(p),
                        Err(e) => {
                            debug!(error = %e, product, "live product fetch failed");
                            None
                        }
                    }
                }
                _ => None,
            };
            *live = Live::Fetched(fetched);
        }
        match live {
            Live::Fetched(p) => p.as_ref(),
            Live::NotFetched => None,
        }
    }
}

/// Image dimensions with both sides positive.
fn measurable(images: Vec<ImageRef>) -> Vec<(i64, i64)> {
    images
        .iter()
        .filter_map(ImageRef::dims)
        .filter(|(w, h)| *w > 0 && *h > 0)
        .collect()
}
