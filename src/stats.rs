//! Database statistics and mapping overview.
//!
//! Provides a quick summary of what's loaded: corpus size, category
//! directory size, sync attempt counts, and the shape of the category to
//! tag mapping built from the corpus. Used by `shelf stats` to confirm that
//! seeding worked before serving predictions.

use anyhow::Result;

use crate::config::Config;
use crate::services::Services;

/// Number of categories listed in the breakdown.
const TOP_CATEGORIES: usize = 10;

/// Run the stats command: rebuild the mapping and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let services = Services::open(config).await?;
    services.rebuild_mapping().await?;
    let counts = services.store.counts().await?;
    let snap = services.cache.snapshot();

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Shelfmark: Database Stats");
    println!("=========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Corpus:      {} books", counts.books);
    println!("  Directory:   {} categories", counts.categories);
    println!(
        "  Commits:     {} ({} failed)",
        counts.sync_records, counts.sync_failed
    );
    println!();
    println!(
        "  Mapping:     {} categories, {} tag links",
        snap.category_count(),
        snap.total_tag_links()
    );
    if services.generator.is_enabled() {
        println!("  LLM:         {}", services.generator.model_name());
    } else {
        println!("  LLM:         disabled");
    }

    let mut ranked: Vec<(&str, usize, usize)> = snap
        .categories()
        .iter()
        .map(|c| (c.as_str(), snap.frequency(c), snap.tags_for(c).len()))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    if !ranked.is_empty() {
        println!();
        println!("  Top categories:");
        println!("  {:>6} {:>6}   {}", "BOOKS", "TAGS", "CATEGORY");
        println!("  {}", "-".repeat(76));
        for (category, freq, tags) in ranked.iter().take(TOP_CATEGORIES) {
            println!("  {:>6} {:>6}   {}", freq, tags, category);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
