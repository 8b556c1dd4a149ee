//! TOML configuration.
//!
//! Every section except `[db]` and `[server]` has defaults, so a minimal
//! file only needs a database path and a bind address:
//!
//! ```toml
//! [db]
//! path = "./data/shelf.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use shelfmark_core::predict::PredictDefaults;
use shelfmark_core::validation::{MissingImages, ValidationPolicy};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub predict: PredictConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PredictConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_fallback_category")]
    pub fallback_category: String,
    #[serde(default = "default_placeholder_tag")]
    pub placeholder_tag: String,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            fallback_category: default_fallback_category(),
            placeholder_tag: default_placeholder_tag(),
        }
    }
}

impl PredictConfig {
    pub fn defaults(&self) -> PredictDefaults {
        PredictDefaults {
            top_k: self.default_top_k,
            fallback_category: self.fallback_category.clone(),
            placeholder_tag: self.placeholder_tag.clone(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_fallback_category() -> String {
    "Books ~ Non-fiction ~ Other".to_string()
}
fn default_placeholder_tag() -> String {
    "tm-nf-other".to_string()
}

/// OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub model: String,
    /// Environment variable holding the bearer token. Unset or empty sends
    /// no `Authorization` header.
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            model: String::new(),
            token_env: None,
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    15
}
fn default_read_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidationConfig {
    #[serde(default = "default_max_title_chars")]
    pub max_title_chars: usize,
    #[serde(default = "default_max_word_chars")]
    pub max_word_chars: usize,
    #[serde(default = "default_min_image_edge")]
    pub min_image_edge_px: i64,
    #[serde(default = "default_missing_images")]
    pub missing_images: String,
    #[serde(default = "default_true")]
    pub live_enrichment: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_title_chars: default_max_title_chars(),
            max_word_chars: default_max_word_chars(),
            min_image_edge_px: default_min_image_edge(),
            missing_images: default_missing_images(),
            live_enrichment: true,
        }
    }
}

impl ValidationConfig {
    /// Convert to the core policy. `missing_images` must already be valid.
    pub fn policy(&self) -> Result<ValidationPolicy> {
        Ok(ValidationPolicy {
            max_title_chars: self.max_title_chars,
            max_word_chars: self.max_word_chars,
            min_image_edge_px: self.min_image_edge_px,
            missing_images: parse_missing_images(&self.missing_images)?,
            live_enrichment: self.live_enrichment,
        })
    }
}

fn parse_missing_images(s: &str) -> Result<MissingImages> {
    match s {
        "warn" => Ok(MissingImages::Warn),
        "error" => Ok(MissingImages::Error),
        other => anyhow::bail!(
            "Unknown validation.missing_images: '{}'. Must be warn or error.",
            other
        ),
    }
}

fn default_max_title_chars() -> usize {
    200
}
fn default_max_word_chars() -> usize {
    20
}
fn default_min_image_edge() -> i64 {
    500
}
fn default_missing_images() -> String {
    "warn".to_string()
}
fn default_true() -> bool {
    true
}

/// GraphQL admin API of the external catalog.
#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    /// URL with a `{shop}` placeholder and an optional `{version}` placeholder.
    #[serde(default = "default_endpoint_template")]
    pub endpoint_template: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_catalog_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub accounts: Vec<CatalogAccount>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint_template: default_endpoint_template(),
            api_version: default_api_version(),
            timeout_secs: default_catalog_timeout(),
            accounts: Vec::new(),
        }
    }
}

impl CatalogConfig {
    pub fn account(&self, id: i64) -> Option<&CatalogAccount> {
        self.accounts.iter().find(|a| a.id == id)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogAccount {
    pub id: i64,
    /// Shop domain, e.g. `example.myshopify.com`.
    pub shop: String,
    /// Environment variable holding the access token.
    pub token_env: String,
}

fn default_endpoint_template() -> String {
    "https://{shop}/admin/api/{version}/graphql.json".to_string()
}
fn default_api_version() -> String {
    "2024-10".to_string()
}
fn default_catalog_timeout() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.predict.default_top_k == 0 {
        anyhow::bail!("predict.default_top_k must be >= 1");
    }

    if config.validation.max_title_chars == 0 {
        anyhow::bail!("validation.max_title_chars must be > 0");
    }
    if config.validation.max_word_chars == 0 {
        anyhow::bail!("validation.max_word_chars must be > 0");
    }
    if config.validation.min_image_edge_px <= 0 {
        anyhow::bail!("validation.min_image_edge_px must be > 0");
    }
    parse_missing_images(&config.validation.missing_images)?;

    if config.llm.enabled {
        if config.llm.endpoint.trim().is_empty() {
            anyhow::bail!("llm.endpoint must be specified when llm.enabled = true");
        }
        if config.llm.model.trim().is_empty() {
            anyhow::bail!("llm.model must be specified when llm.enabled = true");
        }
    }

    let mut seen = HashSet::new();
    for account in &config.catalog.accounts {
        if !seen.insert(account.id) {
            anyhow::bail!("catalog.accounts: duplicate account id {}", account.id);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    const MINIMAL: &str = "[db]\npath = \"x.sqlite\"\n[server]\nbind = \"127.0.0.1:0\"\n";

    #[test]
    fn test_minimal_config_gets_defaults() {
        let f = write(MINIMAL);
        let c = load_config(f.path()).unwrap();
        assert_eq!(c.predict.default_top_k, 5);
        assert_eq!(c.predict.placeholder_tag, "tm-nf-other");
        assert!(!c.llm.enabled);
        assert_eq!(c.llm.connect_timeout_secs, 15);
        assert_eq!(c.validation.max_title_chars, 200);
        let policy = c.validation.policy().unwrap();
        assert_eq!(policy.missing_images, MissingImages::Warn);
        assert!(policy.live_enrichment);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let cases = [
            "[predict]\ndefault_top_k = 0\n",
            "[validation]\nmissing_images = \"ignore\"\n",
            "[validation]\nmin_image_edge_px = 0\n",
            "[llm]\nenabled = true\nmodel = \"m\"\n",
            "[[catalog.accounts]]\nid = 1\nshop = \"a\"\ntoken_env = \"A\"\n\
             [[catalog.accounts]]\nid = 1\nshop = \"b\"\ntoken_env = \"B\"\n",
        ];
        for extra in cases {
            let f = write(&format!("{}{}", MINIMAL, extra));
            assert!(load_config(f.path()).is_err(), "accepted: {}", extra);
        }
    }
}
