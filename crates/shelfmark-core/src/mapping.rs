//! Category → tag mapping cache built from the reference corpus.
//!
//! The cache holds an immutable [`MappingSnapshot`] behind an
//! `RwLock<Arc<_>>`. A rebuild scans the corpus and builds a fresh snapshot
//! off to the side, then swaps the pointer in one step, so readers always
//! see either the old or the new snapshot in full. The write lock is held
//! only for the pointer swap, never while scanning or building.
//!
//! Rebuilds are serialized by a separate async mutex, so two concurrent
//! rebuilds never interleave their scan/publish steps.
//!
//! Every category and tag in a snapshot comes from a corpus record;
//! nothing is invented. Tags are stored in slug form
//! ([`slugify_tag`](crate::normalize::slugify_tag)).
//!
//! ```rust
//! use shelfmark_core::mapping::MappingSnapshot;
//! use shelfmark_core::models::CorpusRecord;
//!
//! let snap = MappingSnapshot::build(&[CorpusRecord {
//!     title: "Pacific Tides".into(),
//!     author: "Sina Vea".into(),
//!     category: "Books ~ Travel".into(),
//!     tags: vec!["Travel".into(), "Pacific Islands".into()],
//! }]);
//! assert_eq!(snap.tags_for("Books ~ Travel"), ["travel", "pacific-islands"]);
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use futures::lock::Mutex;
use tracing::info;

use crate::models::CorpusRecord;
use crate::normalize::{distinct_tokens, slugify_tag};
use crate::store::CorpusStore;

/// One complete, immutable view of the category → tags mapping.
#[derive(Debug, Default)]
pub struct MappingSnapshot {
    /// Distinct categories in first-seen order.
    categories: Vec<String>,
    /// Category → slug tags in first-seen order, no duplicates.
    tags: HashMap<String, Vec<String>>,
    /// Category → number of contributing corpus records.
    frequency: HashMap<String, usize>,
}

impl MappingSnapshot {
    /// Build a snapshot from corpus records.
    ///
    /// Records with a blank category or no tags are skipped. A category whose
    /// tags all slugify to nothing is still registered, with an empty tag set.
    pub fn build(records: &[CorpusRecord]) -> Self {
        let mut snap = MappingSnapshot::default();
        for record in records {
            let category = record.category.trim();
            if category.is_empty() || record.tags.is_empty() {
                continue;
            }
            *snap.frequency.entry(category.to_string()).or_insert(0) += 1;
            let set = match snap.tags.entry(category.to_string()) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => {
                    snap.categories.push(category.to_string());
                    e.insert(Vec::new())
                }
            };
            for tag in &record.tags {
                let slug = slugify_tag(tag);
                if !slug.is_empty() && !set.contains(&slug) {
                    set.push(slug);
                }
            }
        }
        snap
    }

    pub fn is_loaded(&self) -> bool {
        !self.categories.is_empty()
    }

    /// Distinct categories in insertion order.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Tag set for a category; empty when the category is unknown.
    pub fn tags_for(&self, category: &str) -> &[String] {
        self.tags.get(category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn frequency(&self, category: &str) -> usize {
        self.frequency.get(category).copied().unwrap_or(0)
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    /// Sum of tag-set sizes across all categories.
    pub fn total_tag_links(&self) -> usize {
        self.tags.values().map(Vec::len).sum()
    }

    /// Category with the highest frequency; ties go to the first seen.
    pub fn most_frequent(&self) -> Option<&str> {
        self.argmax_by_frequency(self.categories.iter())
    }

    /// Prefer the most frequent category whose path contains `bucket`
    /// (case-insensitive), else the overall most frequent category.
    pub fn by_author_bucket(&self, bucket: &str) -> Option<&str> {
        let needle = bucket.to_lowercase();
        self.argmax_by_frequency(
            self.categories
                .iter()
                .filter(|c| c.to_lowercase().contains(&needle)),
        )
        .or_else(|| self.most_frequent())
    }

    /// Score every category by the number of distinct query tokens that
    /// occur in its lowercased path; break ties by frequency, then by
    /// first-seen order. Falls back to [`by_author_bucket`](Self::by_author_bucket)
    /// when no category scores above zero.
    pub fn best_by_text(&self, title_norm: &str, bucket: &str) -> Option<&str> {
        let tokens = distinct_tokens(title_norm);
        let mut best: Option<(&str, usize, usize)> = None;
        for c in &self.categories {
            let score = token_hits(&tokens, c);
            let freq = self.frequency(c);
            let better = match best {
                None => true,
                Some((_, s, f)) => score > s || (score == s && freq > f),
            };
            if better {
                best = Some((c.as_str(), score, freq));
            }
        }
        match best {
            Some((c, score, _)) if score > 0 => Some(c),
            _ => self.by_author_bucket(bucket),
        }
    }

    /// Category selection for prediction: maximize the number of distinct
    /// query tokens found in the lowercased path, ties broken by insertion
    /// order. An empty query selects the first category.
    pub fn select_for_query(&self, query_norm: &str) -> Option<&str> {
        let first = self.categories.first()?;
        if query_norm.trim().is_empty() {
            return Some(first.as_str());
        }
        let tokens = distinct_tokens(query_norm);
        let mut best = first.as_str();
        let mut best_score = token_hits(&tokens, first);
        for c in self.categories.iter().skip(1) {
            let score = token_hits(&tokens, c);
            if score > best_score {
                best = c.as_str();
                best_score = score;
            }
        }
        Some(best)
    }

    fn argmax_by_frequency<'a>(&self, it: impl Iterator<Item = &'a String>) -> Option<&'a str> {
        let mut best: Option<(&str, usize)> = None;
        for c in it {
            let f = self.frequency(c);
            if best.map_or(true, |(_, bf)| f > bf) {
                best = Some((c.as_str(), f));
            }
        }
        best.map(|(c, _)| c)
    }
}

fn token_hits(tokens: &[&str], category: &str) -> usize {
    let lower = category.to_lowercase();
    tokens.iter().filter(|t| lower.contains(**t)).count()
}

/// Owner of the current mapping snapshot.
///
/// Create one per process (or per test), call [`rebuild`](Self::rebuild)
/// at startup and whenever the corpus changes, and [`clear`](Self::clear)
/// on teardown.
pub struct MappingCache {
    current: RwLock<Arc<MappingSnapshot>>,
    rebuild_lock: Mutex<()>,
}

impl MappingCache {
    /// An empty cache. Nothing is loaded until the first rebuild.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(MappingSnapshot::default())),
            rebuild_lock: Mutex::new(()),
        }
    }

    /// The current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<MappingSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Scan the corpus and publish a new snapshot.
    ///
    /// Idempotent. Concurrent callers are serialized; readers keep using
    /// the previous snapshot until the swap.
    pub async fn rebuild<S>(&self, store: &S) -> Result<Arc<MappingSnapshot>>
    where
        S: CorpusStore + ?Sized,
    {
        let _guard = self.rebuild_lock.lock().await;
        let records = store.scan_tagged().await?;
        let snapshot = Arc::new(MappingSnapshot::build(&records));
        self.swap(Arc::clone(&snapshot));
        info!(
            records = records.len(),
            categories = snapshot.category_count(),
            tag_links = snapshot.total_tag_links(),
            "category-tag mapping rebuilt"
        );
        Ok(snapshot)
    }

    /// Publish a snapshot built from the given records.
    pub async fn rebuild_from(&self, records: &[CorpusRecord]) -> Arc<MappingSnapshot> {
        let _guard = self.rebuild_lock.lock().await;
        let snapshot = Arc::new(MappingSnapshot::build(records));
        self.swap(Arc::clone(&snapshot));
        snapshot
    }

    /// Drop the current mapping, leaving an empty snapshot.
    pub async fn clear(&self) {
        let _guard = self.rebuild_lock.lock().await;
        self.swap(Arc::new(MappingSnapshot::default()));
    }

    fn swap(&self, snapshot: Arc<MappingSnapshot>) {
        match self.current.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_loaded()
    }

    pub fn all_categories(&self) -> Vec<String> {
        self.snapshot().categories().to_vec()
    }

    /// Tag set for a category, or an empty list. Never absent.
    pub fn tags_by_category(&self, category: &str) -> Vec<String> {
        self.snapshot().tags_for(category).to_vec()
    }

    pub fn choose_most_frequent_category(&self) -> Option<String> {
        self.snapshot().most_frequent().map(str::to_string)
    }

    pub fn choose_category_by_author_bucket(&self, bucket: &str) -> Option<String> {
        self.snapshot().by_author_bucket(bucket).map(str::to_string)
    }

    pub fn choose_best_category_by_text(&self, title_norm: &str, bucket: &str) -> Option<String> {
        self.snapshot()
            .best_by_text(title_norm, bucket)
            .map(str::to_string)
    }
}

impl Default for MappingCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::author_bucket;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Corpus whose scans park until released, one release per scan.
    struct GatedCorpus {
        records: Vec<CorpusRecord>,
        scans_started: AtomicUsize,
        release: Notify,
    }

    #[async_trait]
    impl CorpusStore for GatedCorpus {
        async fn find_exact(&self, _: &str, _: &str) -> Result<Option<CorpusRecord>> {
            Ok(None)
        }

        async fn scan_tagged(&self) -> Result<Vec<CorpusRecord>> {
            self.scans_started.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(self.records.clone())
        }

        async fn insert_record(&self, _: &CorpusRecord) -> Result<()> {
            Ok(())
        }
    }

    async fn wait_for_scans(corpus: &GatedCorpus, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while corpus.scans_started.load(Ordering::SeqCst) < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("scan did not start");
    }

    fn rec(category: &str, tags: &[&str]) -> CorpusRecord {
        CorpusRecord {
            title: "t".into(),
            author: "a".into(),
            category: category.into(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_build_groups_slugs_and_counts() {
        let snap = MappingSnapshot::build(&[
            rec("Fiction", &["Adventure", "fiction"]),
            rec("  Fiction ", &["adventure", "Travel Writing"]),
            rec("Rail", &["rail"]),
            rec("   ", &["ignored"]),
            rec("Empty", &[]),
        ]);
        assert_eq!(snap.categories(), ["Fiction", "Rail"]);
        assert_eq!(snap.tags_for("Fiction"), ["adventure", "fiction", "travel-writing"]);
        assert_eq!(snap.frequency("Fiction"), 2);
        assert_eq!(snap.total_tag_links(), 4);
        assert!(snap.tags_for("Unknown").is_empty());
    }

    #[test]
    fn test_most_frequent_ties_first_seen() {
        let snap = MappingSnapshot::build(&[rec("A", &["x"]), rec("B", &["y"])]);
        assert_eq!(snap.most_frequent(), Some("A"));

        let snap = MappingSnapshot::build(&[rec("A", &["x"]), rec("B", &["y"]), rec("B", &["z"])]);
        assert_eq!(snap.most_frequent(), Some("B"));
        assert_eq!(MappingSnapshot::default().most_frequent(), None);
    }

    #[test]
    fn test_by_author_bucket_prefers_matching_path() {
        let snap = MappingSnapshot::build(&[
            rec("Books ~ Travel", &["travel"]),
            rec("Books ~ Travel", &["guide"]),
            rec("Books ~ Fiction ~ Author P-R", &["mystery"]),
        ]);
        assert_eq!(
            snap.by_author_bucket("Author P-R"),
            Some("Books ~ Fiction ~ Author P-R")
        );
        assert_eq!(snap.by_author_bucket("Author V-Z"), Some("Books ~ Travel"));
    }

    #[test]
    fn test_best_by_text_uses_overlap_then_frequency_then_bucket() {
        let snap = MappingSnapshot::build(&[
            rec("Books ~ Rail", &["rail"]),
            rec("Books ~ Rail history", &["history"]),
            rec("Books ~ Rail history", &["rail"]),
            rec("Books ~ Fiction ~ Author M-O", &["novel"]),
        ]);
        assert_eq!(
            snap.best_by_text("rail history", "Author Other"),
            Some("Books ~ Rail history")
        );
        // Both score 1 on "rail"; frequency decides.
        assert_eq!(snap.best_by_text("rail", "x"), Some("Books ~ Rail history"));
        assert_eq!(
            snap.best_by_text("zzz", "Author M-O"),
            Some("Books ~ Fiction ~ Author M-O")
        );
    }

    #[test]
    fn test_select_for_query() {
        let snap = MappingSnapshot::build(&[
            rec("Fiction", &["a"]),
            rec("Travel ~ Pacific", &["b"]),
        ]);
        assert_eq!(snap.select_for_query(""), Some("Fiction"));
        assert_eq!(snap.select_for_query("pacific tides sina vea"), Some("Travel ~ Pacific"));
        assert_eq!(snap.select_for_query("nothing matches"), Some("Fiction"));
        assert_eq!(MappingSnapshot::default().select_for_query("x"), None);
    }

    #[tokio::test]
    async fn test_rebuild_swaps_whole_snapshot() {
        let store = InMemoryStore::with_records(vec![rec("Fiction", &["adventure"])]);
        let cache = MappingCache::new();
        assert!(!cache.is_loaded());

        let before = cache.snapshot();
        cache.rebuild(&store).await.unwrap();
        assert!(cache.is_loaded());
        // Old readers keep their complete (empty) view.
        assert!(!before.is_loaded());
        assert_eq!(cache.tags_by_category("Fiction"), vec!["adventure"]);

        // Rebuild is idempotent.
        cache.rebuild(&store).await.unwrap();
        assert_eq!(cache.all_categories(), vec!["Fiction"]);

        cache.clear().await;
        assert!(!cache.is_loaded());
    }

    #[tokio::test]
    async fn test_readers_see_old_snapshot_while_rebuild_is_parked() {
        let cache = Arc::new(MappingCache::new());
        cache.rebuild_from(&[rec("Old", &["x"])]).await;
        let corpus = Arc::new(GatedCorpus {
            records: vec![rec("New", &["y"])],
            scans_started: AtomicUsize::new(0),
            release: Notify::new(),
        });

        let first = tokio::spawn({
            let (cache, corpus) = (cache.clone(), corpus.clone());
            async move { cache.rebuild(corpus.as_ref()).await.map(|s| s.category_count()) }
        });
        wait_for_scans(&corpus, 1).await;

        // Mid-rebuild reads return the complete previous mapping.
        assert_eq!(cache.all_categories(), vec!["Old"]);
        assert_eq!(cache.tags_by_category("Old"), vec!["x"]);
        assert!(cache.tags_by_category("New").is_empty());

        let second = tokio::spawn({
            let (cache, corpus) = (cache.clone(), corpus.clone());
            async move { cache.rebuild(corpus.as_ref()).await.map(|s| s.category_count()) }
        });
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        // The second rebuild waits on the first instead of scanning alongside it.
        assert_eq!(corpus.scans_started.load(Ordering::SeqCst), 1);
        assert!(cache.rebuild_lock.try_lock().is_none());

        corpus.release.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), 1);
        assert_eq!(cache.all_categories(), vec!["New"]);

        wait_for_scans(&corpus, 2).await;
        corpus.release.notify_one();
        assert_eq!(second.await.unwrap().unwrap(), 1);
        assert!(cache.rebuild_lock.try_lock().is_some());
    }

    #[tokio::test]
    async fn test_cache_selectors_follow_current_snapshot() {
        let cache = MappingCache::new();
        assert_eq!(cache.choose_most_frequent_category(), None);

        cache
            .rebuild_from(&[
                rec("Books ~ Travel", &["travel"]),
                rec("Books ~ Travel", &["guide"]),
                rec("Books ~ Fiction ~ Author P-R", &["mystery"]),
                rec("Books ~ Rail history", &["rail"]),
            ])
            .await;

        assert_eq!(
            cache.choose_most_frequent_category().as_deref(),
            Some("Books ~ Travel")
        );
        let bucket = author_bucket("quinn harper");
        assert_eq!(
            cache.choose_category_by_author_bucket(bucket).as_deref(),
            Some("Books ~ Fiction ~ Author P-R")
        );
        assert_eq!(
            cache.choose_best_category_by_text("rail history", bucket).as_deref(),
            Some("Books ~ Rail history")
        );
        assert_eq!(
            cache.choose_best_category_by_text("zzz", author_bucket("zed")).as_deref(),
            Some("Books ~ Travel")
        );
    }
}
