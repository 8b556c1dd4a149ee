//! Validate-then-commit gate.
//!
//! Every commit attempt produces exactly one audit record. The catalog is
//! contacted only after validation passes, and a catalog failure is
//! recorded as a `FAILED` attempt rather than returned as an error.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::catalog::CatalogClient;
use crate::error::{ShelfError, ShelfResult};
use crate::models::{NewSyncAttempt, SyncAttemptRecord, SyncOutcome};
use crate::payload::ProductPayload;
use crate::store::AuditStore;
use crate::validation::Validator;

pub const SUCCESS_MESSAGE: &str = "Updated catalog and saved local record.";

pub struct SyncGate {
    validator: Arc<Validator>,
    catalog: Arc<dyn CatalogClient>,
    audit: Arc<dyn AuditStore>,
}

impl SyncGate {
    pub fn new(
        validator: Arc<Validator>,
        catalog: Arc<dyn CatalogClient>,
        audit: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            validator,
            catalog,
            audit,
        }
    }

    /// Validate `payload` and, if it passes, push it to the catalog.
    ///
    /// Returns the persisted audit record. Errors only for rejected input
    /// (blank product id, non-object payload) or a failure to write the
    /// audit record. A directory read failure during validation is
    /// recorded as a `FAILED` attempt.
    pub async fn commit(
        &self,
        account_id: i64,
        product_id: &str,
        payload: &Value,
    ) -> ShelfResult<SyncAttemptRecord> {
        let product_id = product_id.trim();
        if product_id.is_empty() {
            return Err(ShelfError::input("productId is required"));
        }
        let mut parsed = ProductPayload::from_value(payload)?;
        // Enrichment needs to know which live product this edit targets.
        parsed.account_id.get_or_insert(account_id);
        if parsed.product_ref().is_none() {
            parsed.product_id = Some(product_id.to_string());
        }

        let verdict = self.validator.validate(&parsed).await;

        let mut attempt = NewSyncAttempt {
            account_id,
            product_id: product_id.to_string(),
            title: parsed.display_title(),
            outcome: SyncOutcome::Failed,
            message: String::new(),
            payload_json: payload.to_string(),
            response_json: None,
            created_at: Utc::now(),
        };

        let verdict = match verdict {
            Ok(v) => v,
            Err(e) => {
                warn!(account_id, product_id, error = %e, "validation could not run");
                attempt.message = format!("Validation could not run: {}", e);
                return Ok(self.audit.append(attempt).await?);
            }
        };

        if !verdict.pass {
            attempt.message = format!("Validation failed with {} issue(s).", verdict.failed);
            info!(account_id, product_id, failed = verdict.failed, "commit blocked by validation");
            return Ok(self.audit.append(attempt).await?);
        }

        match self.catalog.update(account_id, product_id, &parsed).await {
            Ok(response) => {
                attempt.outcome = SyncOutcome::Success;
                attempt.message = SUCCESS_MESSAGE.to_string();
                attempt.response_json = Some(response.to_string());
                info!(account_id, product_id, "commit applied to catalog");
            }
            Err(e) => {
                let detail = format!("{:#}", e);
                warn!(account_id, product_id, error = %detail, "catalog update failed");
                attempt.message = format!("Catalog update failed: {}", detail);
                attempt.response_json = Some(json!({ "error": detail }).to_string());
            }
        }
        Ok(self.audit.append(attempt).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogProduct;
    use crate::models::CategoryEntry;
    use crate::store::CategoryDirectory;
    use crate::store::memory::InMemoryStore;
    use crate::validation::ValidationPolicy;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCatalog {
        fail_with: Option<&'static str>,
        updates: AtomicUsize,
    }

    impl CountingCatalog {
        fn new(fail_with: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                fail_with,
                updates: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CatalogClient for CountingCatalog {
        async fn query(&self, _: i64, _: &str) -> Result<CatalogProduct> {
            bail!("offline")
        }
        async fn update(&self, _: i64, product_id: &str, _: &ProductPayload) -> Result<Value> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            match self.fail_with {
                Some(msg) => bail!("{}", msg),
                None => Ok(json!({ "product": { "id": product_id } })),
            }
        }
    }

    struct BrokenDirectory;

    #[async_trait]
    impl CategoryDirectory for BrokenDirectory {
        async fn find_path(&self, _: i64) -> Result<Option<String>> {
            bail!("database is locked")
        }
        async fn search(&self, _: &str, _: usize) -> Result<Vec<CategoryEntry>> {
            bail!("database is locked")
        }
        async fn insert_ignore(&self, _: &[CategoryEntry]) -> Result<usize> {
            bail!("database is locked")
        }
    }

    fn gate(catalog: Arc<CountingCatalog>) -> (SyncGate, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store.add_category(350000001, "Books ~ Travel");
        let validator = Arc::new(Validator::new(
            store.clone(),
            catalog.clone(),
            ValidationPolicy::default(),
        ));
        (SyncGate::new(validator, catalog, store.clone()), store)
    }

    fn valid_payload() -> Value {
        json!({
            "title": "Pacific Tides",
            "categoryId": 350000001,
            "images": [{ "width": 900, "height": 900 }]
        })
    }

    #[tokio::test]
    async fn test_invalid_payload_never_reaches_catalog() {
        let catalog = CountingCatalog::new(None);
        let (gate, store) = gate(catalog.clone());
        let payload = json!({ "title": "x".repeat(201), "categoryId": 1 });

        let rec = gate.commit(7, "42", &payload).await.unwrap();
        assert_eq!(rec.outcome, SyncOutcome::Failed);
        assert!(rec.message.starts_with("Validation failed with"));
        assert_eq!(catalog.updates.load(Ordering::SeqCst), 0);
        assert_eq!(store.audit_records().len(), 1);
    }

    #[tokio::test]
    async fn test_catalog_error_is_recorded_not_raised() {
        let catalog = CountingCatalog::new(Some("timed out"));
        let (gate, store) = gate(catalog.clone());

        let rec = gate.commit(7, "42", &valid_payload()).await.unwrap();
        assert_eq!(rec.outcome, SyncOutcome::Failed);
        assert!(rec.message.contains("timed out"));
        assert!(rec.response_json.as_deref().unwrap().contains("timed out"));
        assert_eq!(catalog.updates.load(Ordering::SeqCst), 1);
        assert_eq!(store.audit_records().len(), 1);
    }

    #[tokio::test]
    async fn test_success_records_response_and_title() {
        let catalog = CountingCatalog::new(None);
        let (gate, store) = gate(catalog.clone());

        let rec = gate.commit(7, " 42 ", &valid_payload()).await.unwrap();
        assert_eq!(rec.outcome, SyncOutcome::Success);
        assert_eq!(rec.product_id, "42");
        assert_eq!(rec.title.as_deref(), Some("Pacific Tides"));
        assert!(rec.response_json.unwrap().contains("42"));
        assert_eq!(store.audit_records()[0].message, SUCCESS_MESSAGE);
    }

    #[tokio::test]
    async fn test_directory_failure_is_recorded() {
        let catalog = CountingCatalog::new(None);
        let store = Arc::new(InMemoryStore::new());
        let validator = Arc::new(Validator::new(
            Arc::new(BrokenDirectory),
            catalog.clone(),
            ValidationPolicy::default(),
        ));
        let gate = SyncGate::new(validator, catalog.clone(), store.clone());

        let rec = gate.commit(7, "42", &valid_payload()).await.unwrap();
        assert_eq!(rec.outcome, SyncOutcome::Failed);
        assert!(rec.message.starts_with("Validation could not run:"));
        assert!(rec.message.contains("database is locked"));
        assert_eq!(catalog.updates.load(Ordering::SeqCst), 0);
        assert_eq!(store.audit_records().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_input_writes_nothing() {
        let catalog = CountingCatalog::new(None);
        let (gate, store) = gate(catalog);
        assert!(gate.commit(7, "  ", &valid_payload()).await.unwrap_err().is_input());
        assert!(gate.commit(7, "42", &json!([])).await.unwrap_err().is_input());
        assert!(store.audit_records().is_empty());
    }
}
