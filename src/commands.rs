//! CLI front-ends for prediction, validation, seeding and the audit log.
//!
//! Each command opens [`Services`] from configuration and prints a
//! human-readable report; `--json` switches to the same JSON the HTTP API
//! returns.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use shelfmark_core::models::{IssueLevel, PredictionResult, SyncOutcome, ValidationResult};
use shelfmark_core::payload::ProductPayload;
use shelfmark_core::predict::PredictRequest;
use shelfmark_core::store::{AuditQuery, AuditStore};

use crate::config::Config;
use crate::seed;
use crate::services::Services;

/// What `shelf seed` loads.
pub enum SeedSource<'a> {
    Corpus(&'a Path),
    Categories(&'a Path),
    Samples,
}

pub async fn run_seed(config: &Config, source: SeedSource<'_>) -> Result<()> {
    let services = Services::open(config).await?;
    let store = services.store.as_ref();
    let (label, report) = match source {
        SeedSource::Corpus(path) => ("corpus", seed::seed_corpus_file(store, path).await?),
        SeedSource::Categories(path) => (
            "categories",
            seed::seed_categories_file(store, path).await?,
        ),
        SeedSource::Samples => ("samples", seed::seed_samples(store).await?),
    };
    println!(
        "Seeded {}: {} inserted, {} skipped",
        label, report.inserted, report.skipped
    );
    Ok(())
}

pub async fn run_predict(
    config: &Config,
    title: &str,
    author: Option<&str>,
    top_k: Option<usize>,
    use_ai: bool,
    json: bool,
) -> Result<()> {
    let services = Services::open(config).await?;
    services.rebuild_mapping().await?;

    let mut req = PredictRequest::new(title, author.unwrap_or_default()).use_ai(use_ai);
    if let Some(k) = top_k {
        req = req.top_k(k);
    }
    let result = services.predictor.predict(&req).await?;

    if json {
        return print_json(&result);
    }
    print_prediction(&result);
    Ok(())
}

fn print_prediction(result: &PredictionResult) {
    println!("Category:    {}", result.category);
    println!(
        "Strategy:    {} (confidence {:.2})",
        result.strategy, result.confidence
    );
    println!("Reason:      {}", result.rationale);
    if result.llm_called {
        println!(
            "LLM:         called, {}",
            if result.llm_effective { "effective" } else { "fell back" }
        );
    }
    println!();
    if result.tags.is_empty() {
        println!("No tags.");
        return;
    }
    for (i, t) in result.tags.iter().enumerate() {
        println!("  {}. [{:.2}] {}", i + 1, t.score, t.tag);
    }
}

pub async fn run_validate(config: &Config, file: &Path, json: bool) -> Result<()> {
    let value = read_json_file(file)?;
    let services = Services::open(config).await?;
    let payload = ProductPayload::from_value(&value)?;
    let result = services.validator.validate(&payload).await?;

    if json {
        return print_json(&result);
    }
    print_validation(&result);
    Ok(())
}

fn print_validation(result: &ValidationResult) {
    println!(
        "{} ({} issue(s), {} error(s) across {} rule groups)",
        if result.pass { "PASS" } else { "FAIL" },
        result.failed,
        result.error_count(),
        result.total
    );
    println!();
    for issue in &result.issues {
        let level = match issue.level {
            IssueLevel::Error => "ERROR",
            IssueLevel::Warn => "WARN",
            IssueLevel::Ok => "OK",
        };
        println!("  {:<5} {:<12} {}", level, issue.field_path, issue.message);
    }
}

pub async fn run_commit(
    config: &Config,
    account_id: i64,
    product_id: &str,
    file: &Path,
    json: bool,
) -> Result<()> {
    let value = read_json_file(file)?;
    let services = Services::open(config).await?;
    let record = services.gate.commit(account_id, product_id, &value).await?;

    if json {
        return print_json(&record);
    }
    println!("Record {}: {}", record.id, record.outcome.as_str());
    println!("  {}", record.message);
    Ok(())
}

pub async fn run_records(config: &Config, query: AuditQuery, json: bool) -> Result<()> {
    let services = Services::open(config).await?;
    let page = services.store.list(&query).await?;

    if json {
        return print_json(&page);
    }
    if page.items.is_empty() {
        println!("No records.");
        return Ok(());
    }

    println!(
        "{:>6} {:>8} {:<16} {:<8} {:<20} {}",
        "ID", "ACCOUNT", "PRODUCT", "STATUS", "CREATED", "TITLE"
    );
    println!("{}", "-".repeat(90));
    for r in &page.items {
        println!(
            "{:>6} {:>8} {:<16} {:<8} {:<20} {}",
            r.id,
            r.account_id,
            r.product_id,
            r.outcome.as_str(),
            r.created_at.format("%Y-%m-%d %H:%M:%S"),
            r.title.as_deref().unwrap_or("-")
        );
        if r.outcome == SyncOutcome::Failed {
            println!("{:>6} {}", "", r.message);
        }
    }
    println!();
    println!(
        "page {} (size {}), {} record(s) total",
        page.page, page.size, page.total
    );
    Ok(())
}

fn read_json_file(file: &Path) -> Result<serde_json::Value> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read payload file: {}", file.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Payload is not JSON: {}", file.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
