//! Loading reference data: the corpus and the category directory.
//!
//! | Command | Input |
//! |---------|-------|
//! | `shelf seed corpus <csv>` | `title,author,category,tags` rows |
//! | `shelf seed categories <tsv>` | `<id>\t<path>` rows |
//! | `shelf seed samples` | a fixed ten-book corpus |
//!
//! Corpus CSV headers may also use the export names `book_title`,
//! `book_author`, `trademe_categories` and `shopify_tags`. The tags column
//! holds a JSON array, or a list separated by `|` or `,`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::{BufRead, Read};
use std::path::Path;
use tracing::{info, warn};

use shelfmark_core::models::{CategoryEntry, CorpusRecord};
use shelfmark_core::store::{CategoryDirectory, CorpusStore};

#[derive(Debug, Deserialize)]
struct CorpusRow {
    #[serde(alias = "book_title")]
    title: String,
    #[serde(default, alias = "book_author")]
    author: String,
    #[serde(default, alias = "trademe_categories")]
    category: String,
    #[serde(default, alias = "shopify_tags")]
    tags: String,
}

/// Outcome of a seeding run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// Drop a trailing `[n]` disambiguation marker from a title.
pub fn clean_title(title: &str) -> String {
    let t = title.trim();
    if let Some(stripped) = t.strip_suffix(']') {
        if let Some(open) = stripped.rfind('[') {
            let digits = &stripped[open + 1..];
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                return stripped[..open].trim_end().to_string();
            }
        }
    }
    t.to_string()
}

/// Parse a tags cell: JSON array, JSON string, or a `|`/`,` separated list.
pub fn parse_tags_cell(cell: &str) -> Vec<String> {
    let s = cell.trim();
    if s.is_empty() {
        return Vec::new();
    }
    if let Ok(list) = serde_json::from_str::<Vec<String>>(s) {
        return list
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
    }
    if let Ok(single) = serde_json::from_str::<String>(s) {
        return parse_tags_cell(&single);
    }
    let sep = if s.contains('|') { '|' } else { ',' };
    s.split(sep)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read corpus records from CSV. Rows with a blank title are skipped.
pub fn read_corpus_csv<R: Read>(reader: R) -> Result<(Vec<CorpusRecord>, usize)> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut records = Vec::new();
    let mut skipped = 0;
    for (line, row) in rdr.deserialize::<CorpusRow>().enumerate() {
        let row = row.with_context(|| format!("corpus CSV row {}", line + 2))?;
        let title = clean_title(&row.title);
        if title.is_empty() {
            skipped += 1;
            continue;
        }
        records.push(CorpusRecord {
            title,
            author: row.author.trim().to_string(),
            category: row.category.trim().to_string(),
            tags: parse_tags_cell(&row.tags),
        });
    }
    Ok((records, skipped))
}

/// Read `<id>\t<path>` lines. A leading `categoryid` header, blank lines and
/// malformed lines are skipped.
pub fn read_category_tsv<R: BufRead>(reader: R) -> Result<(Vec<CategoryEntry>, usize)> {
    let mut entries = Vec::new();
    let mut skipped = 0;
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if i == 0 && trimmed.to_lowercase().starts_with("categoryid") {
            continue;
        }
        let Some((id, path)) = trimmed.split_once('\t') else {
            skipped += 1;
            continue;
        };
        match (id.trim().parse::<i64>(), path.trim()) {
            (Ok(id), path) if !path.is_empty() => entries.push(CategoryEntry {
                category_id: id,
                category: path.to_string(),
            }),
            _ => skipped += 1,
        }
    }
    Ok((entries, skipped))
}

pub async fn seed_corpus_file<S>(store: &S, path: &Path) -> Result<SeedReport>
where
    S: CorpusStore + ?Sized,
{
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open corpus file: {}", path.display()))?;
    let (records, skipped) = read_corpus_csv(file)?;
    for r in &records {
        store.insert_record(r).await?;
    }
    info!(inserted = records.len(), skipped, "corpus seeded");
    Ok(SeedReport {
        inserted: records.len(),
        skipped,
    })
}

pub async fn seed_categories_file<S>(store: &S, path: &Path) -> Result<SeedReport>
where
    S: CategoryDirectory + ?Sized,
{
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open category file: {}", path.display()))?;
    let (entries, malformed) = read_category_tsv(std::io::BufReader::new(file))?;
    if malformed > 0 {
        warn!(malformed, "skipped malformed category lines");
    }
    let inserted = store.insert_ignore(&entries).await?;
    let duplicates = entries.len() - inserted;
    info!(inserted, duplicates, "category directory seeded");
    Ok(SeedReport {
        inserted,
        skipped: malformed + duplicates,
    })
}

/// A small hand-written corpus for trying the service without real data.
pub fn sample_corpus() -> Vec<CorpusRecord> {
    const SAMPLES: &[(&str, &str, &str, &[&str])] = &[
        (
            "The TranzAlpine Express",
            "Roy Sinclair",
            "Books ~ Non-fiction ~ Transport ~ Rail",
            &["rail", "new-zealand", "transport"],
        ),
        (
            "Steps Across the Alps",
            "Paula Ridge",
            "Books ~ Non-fiction ~ Sport ~ Climbing, hiking & tramping",
            &["hiking", "tramping", "outdoors"],
        ),
        (
            "Mystery at Milford Sound",
            "Quinn Harper",
            "Books ~ Fiction & literature ~ Mystery & thriller ~ Author P-R",
            &["mystery", "thriller", "nz-fiction"],
        ),
        (
            "Pacific Tides",
            "Sina Vea",
            "Books ~ Non-fiction ~ Travel ~ Pacific Islands",
            &["travel", "pacific", "culture"],
        ),
        (
            "Rails of Aotearoa",
            "Murray Cole",
            "Books ~ Non-fiction ~ New Zealand",
            &["new-zealand", "history", "rail"],
        ),
        (
            "Desert Tracks Australia",
            "Adam Brown",
            "Books ~ Non-fiction ~ Travel ~ Australia",
            &["travel", "australia", "guide"],
        ),
        (
            "The Last Signal",
            "Victor Stone",
            "Books ~ Fiction & literature ~ Science fiction & fantasy ~ Author V-Z",
            &["science-fiction", "future", "adventure"],
        ),
        (
            "Business Laws Made Simple",
            "Helen Marsh",
            "Books ~ Non-fiction ~ Business, finance & law ~ Law",
            &["business", "law", "reference"],
        ),
        (
            "World War I Frontlines",
            "Peter Grant",
            "Books ~ Non-fiction ~ War & military ~ World War I",
            &["war", "history", "ww1"],
        ),
        (
            "Healthy Mind Reset",
            "Sophie Lin",
            "Books ~ Non-fiction ~ Health & lifestyle ~ Mental health",
            &["mental-health", "wellbeing", "self-help"],
        ),
    ];

    SAMPLES
        .iter()
        .map(|(title, author, category, tags)| CorpusRecord {
            title: title.to_string(),
            author: author.to_string(),
            category: category.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        })
        .collect()
}

pub async fn seed_samples<S>(store: &S) -> Result<SeedReport>
where
    S: CorpusStore + ?Sized,
{
    let samples = sample_corpus();
    for r in &samples {
        store.insert_record(r).await?;
    }
    Ok(SeedReport {
        inserted: samples.len(),
        skipped: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfmark_core::store::memory::InMemoryStore;

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("Understanding Sticker [10]"), "Understanding Sticker");
        assert_eq!(clean_title("Foo[12]  "), "Foo");
        assert_eq!(clean_title("Volume [II]"), "Volume [II]");
        assert_eq!(clean_title("[3]"), "");
    }

    #[test]
    fn test_parse_tags_cell() {
        assert_eq!(parse_tags_cell(r#"["rail", " nz "]"#), vec!["rail", "nz"]);
        assert_eq!(parse_tags_cell("rail|new-zealand"), vec!["rail", "new-zealand"]);
        assert_eq!(parse_tags_cell("a, b,,c"), vec!["a", "b", "c"]);
        assert_eq!(parse_tags_cell(r#""solo""#), vec!["solo"]);
        assert!(parse_tags_cell("  ").is_empty());
    }

    #[test]
    fn test_read_corpus_csv_accepts_export_headers() {
        let csv = "book_title,book_author,trademe_categories,shopify_tags\n\
                   Pacific Tides [2],Sina Vea,Books ~ Travel,\"[\"\"travel\"\"]\"\n\
                   ,Nobody,Books ~ Travel,x\n";
        let (records, skipped) = read_corpus_csv(csv.as_bytes()).unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Pacific Tides");
        assert_eq!(records[0].tags, vec!["travel"]);
    }

    #[test]
    fn test_read_category_tsv() {
        let tsv = "CategoryId\tCategory\n350000001\tBooks ~ Travel\n\nbad line\nx\tBooks\n350000002\t Books ~ Rail \n";
        let (entries, skipped) = read_category_tsv(tsv.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].category, "Books ~ Rail");
        assert_eq!(skipped, 2);
    }

    #[tokio::test]
    async fn test_seed_samples_populates_mapping() {
        let store = InMemoryStore::new();
        let report = seed_samples(&store).await.unwrap();
        assert_eq!(report.inserted, 10);
        assert_eq!(store.scan_tagged().await.unwrap().len(), 10);
    }
}
