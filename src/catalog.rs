//! GraphQL admin client for the external product catalog.
//!
//! Implements the core [`CatalogClient`] against a Shopify-style admin
//! GraphQL endpoint. Accounts are listed in `[[catalog.accounts]]`; each
//! names the environment variable holding its access token, which is read
//! at call time and sent as `X-Shopify-Access-Token`.
//!
//! A response with a top-level `errors` member, or a `productUpdate` with
//! non-empty `userErrors`, is a failure.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use shelfmark_core::catalog::{CatalogClient, CatalogProduct, OfflineCatalog};
use shelfmark_core::payload::{ProductPayload, RawEnvelope};

use crate::config::{CatalogAccount, CatalogConfig};

const PRODUCT_GID_PREFIX: &str = "gid://shopify/Product/";

const PRODUCT_QUERY: &str = r#"
query ($id: ID!) {
  product(id: $id) {
    id
    title
    tags
    images(first: 20) {
      edges { node { url width height } }
    }
  }
}
"#;

const PRODUCT_UPDATE: &str = r#"
mutation ProductUpdate($input: ProductInput!) {
  productUpdate(input: $input) {
    product { id title }
    userErrors { field message }
  }
}
"#;

pub struct GraphqlCatalog {
    client: reqwest::Client,
    config: CatalogConfig,
}

impl GraphqlCatalog {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client for catalog")?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn account(&self, id: i64) -> Result<&CatalogAccount> {
        self.config
            .account(id)
            .ok_or_else(|| anyhow!("unknown catalog account: {}", id))
    }

    fn endpoint(&self, account: &CatalogAccount) -> String {
        self.config
            .endpoint_template
            .replace("{shop}", account.shop.trim())
            .replace("{version}", &self.config.api_version)
    }

    async fn post(&self, account_id: i64, query: &str, variables: Value) -> Result<Value> {
        let account = self.account(account_id)?;
        let token = std::env::var(&account.token_env)
            .map_err(|_| anyhow!("{} not set for catalog account {}", account.token_env, account_id))?;

        let response = self
            .client
            .post(self.endpoint(account))
            .header("X-Shopify-Access-Token", token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .context("catalog request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("catalog error {}: {}", status, body_text);
        }

        let body: Value = response.json().await.context("catalog response is not JSON")?;
        if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
            bail!("catalog returned errors: {}", errors);
        }
        Ok(body)
    }
}

#[async_trait]
impl CatalogClient for GraphqlCatalog {
    async fn query(&self, account_id: i64, product_id: &str) -> Result<CatalogProduct> {
        let gid = product_gid(product_id)?;
        let body = self
            .post(account_id, PRODUCT_QUERY, json!({ "id": gid }))
            .await?;
        let envelope: RawEnvelope =
            serde_json::from_value(body).context("unexpected product query shape")?;
        let product = envelope
            .product()
            .ok_or_else(|| anyhow!("product not found: {}", gid))?;
        debug!(account_id, product = %gid, "fetched live product");
        Ok(CatalogProduct {
            tags: product.tags.clone(),
            images: product.images(),
        })
    }

    async fn update(
        &self,
        account_id: i64,
        product_id: &str,
        payload: &ProductPayload,
    ) -> Result<Value> {
        let input = update_input(product_id, payload)?;
        let body = self
            .post(account_id, PRODUCT_UPDATE, json!({ "input": input }))
            .await?;

        let reply: UpdateEnvelope =
            serde_json::from_value(body.clone()).context("unexpected productUpdate shape")?;
        let errors = reply
            .data
            .and_then(|d| d.product_update)
            .map(|u| u.user_errors)
            .unwrap_or_default();
        if !errors.is_empty() {
            let detail: Vec<String> = errors.iter().map(UserError::describe).collect();
            bail!("productUpdate rejected: {}", detail.join(" | "));
        }
        Ok(body)
    }
}

#[derive(Deserialize)]
struct UpdateEnvelope {
    #[serde(default)]
    data: Option<UpdateData>,
}

#[derive(Deserialize)]
struct UpdateData {
    #[serde(default, rename = "productUpdate")]
    product_update: Option<ProductUpdate>,
}

#[derive(Deserialize)]
struct ProductUpdate {
    #[serde(default, rename = "userErrors")]
    user_errors: Vec<UserError>,
}

#[derive(Deserialize)]
struct UserError {
    #[serde(default)]
    field: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

impl UserError {
    fn describe(&self) -> String {
        let field = match &self.field {
            Some(Value::Array(parts)) => parts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("."),
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        };
        let message = self
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("Unknown error");
        if field.is_empty() {
            message.to_string()
        } else {
            format!("{}: {}", field, message)
        }
    }
}

/// `gid://shopify/Product/<n>` for a numeric id; full gids pass through.
pub fn product_gid(product_id: &str) -> Result<String> {
    let id = product_id.trim();
    if id.starts_with(PRODUCT_GID_PREFIX) {
        return Ok(id.to_string());
    }
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        bail!("productId must be numeric or a full product gid: {}", product_id);
    }
    Ok(format!("{}{}", PRODUCT_GID_PREFIX, id))
}

/// Build the `ProductInput` for `productUpdate`.
///
/// Blank scalar fields are omitted. Tags are sent only when the payload
/// lists at least one, and metafields only when well-formed.
pub fn update_input(product_id: &str, payload: &ProductPayload) -> Result<Value> {
    let mut input = Map::new();
    input.insert("id".into(), json!(product_gid(product_id)?));

    let scalars = [
        ("title", &payload.title),
        ("vendor", &payload.vendor),
        ("productType", &payload.product_type),
        ("descriptionHtml", &payload.description_html),
        ("status", &payload.status),
    ];
    for (key, value) in scalars {
        if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            input.insert(key.into(), json!(v));
        }
    }

    let tags: Vec<&str> = payload
        .tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if !tags.is_empty() {
        input.insert("tags".into(), json!(tags));
    }

    let metafields: Vec<Value> = payload
        .metafields
        .iter()
        .filter(|m| m.is_well_formed())
        .map(|m| {
            json!({
                "namespace": m.namespace.as_deref().unwrap_or_default().trim(),
                "key": m.key.as_deref().unwrap_or_default().trim(),
                "type": m.kind.as_deref().unwrap_or_default().trim(),
                "value": m.value.as_deref().unwrap_or_default(),
            })
        })
        .collect();
    if !metafields.is_empty() {
        input.insert("metafields".into(), Value::Array(metafields));
    }

    Ok(Value::Object(input))
}

/// The configured catalog, or [`OfflineCatalog`] when no account exists.
pub fn create_catalog(config: &CatalogConfig) -> Result<Arc<dyn CatalogClient>> {
    if config.accounts.is_empty() {
        return Ok(Arc::new(OfflineCatalog));
    }
    Ok(Arc::new(GraphqlCatalog::new(config)?))
}
