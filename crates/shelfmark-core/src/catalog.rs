//! External catalog seam.
//!
//! The catalog owns the live product records. Validation reads from it to
//! fill gaps in a payload; the sync gate writes to it after a local
//! validation pass. Implementations report every failure as an `Err`; the
//! callers decide whether to ignore it or record it.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::payload::{ImageRef, ProductPayload};

/// Live state of one product, as far as validation cares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogProduct {
    pub tags: Vec<String>,
    pub images: Vec<ImageRef>,
}

#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch current tags and images for a product.
    async fn query(&self, account_id: i64, product_id: &str) -> Result<CatalogProduct>;

    /// Apply a validated edit. Returns the catalog's response envelope.
    async fn update(
        &self,
        account_id: i64,
        product_id: &str,
        payload: &ProductPayload,
    ) -> Result<Value>;
}

/// A catalog that is never reachable. Queries and updates always fail.
pub struct OfflineCatalog;

#[async_trait]
impl CatalogClient for OfflineCatalog {
    async fn query(&self, _account_id: i64, _product_id: &str) -> Result<CatalogProduct> {
        anyhow::bail!("catalog is not configured")
    }

    async fn update(&self, _account_id: i64, _product_id: &str, _: &ProductPayload) -> Result<Value> {
        anyhow::bail!("catalog is not configured")
    }
}
