//! In-memory store implementation for testing.
//!
//! Uses `Vec` and `BTreeMap` behind `std::sync::RwLock` for thread safety.
//! Implements every store trait so a full prediction/validation/sync
//! pipeline can run without SQLite.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CategoryEntry, CorpusRecord, NewSyncAttempt, SyncAttemptRecord};
use crate::normalize::normalize;

use super::{AuditQuery, AuditStore, CategoryDirectory, CorpusStore, Page, MAX_PAGE_SIZE};

/// In-memory store for tests.
pub struct InMemoryStore {
    records: RwLock<Vec<CorpusRecord>>,
    categories: RwLock<BTreeMap<i64, String>>,
    audit: RwLock<Vec<SyncAttemptRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            categories: RwLock::new(BTreeMap::new()),
            audit: RwLock::new(Vec::new()),
        }
    }

    /// Build a store pre-populated with corpus records.
    pub fn with_records(records: Vec<CorpusRecord>) -> Self {
        let store = Self::new();
        *store.records.write().unwrap() = records;
        store
    }

    /// Add a category directory entry.
    pub fn add_category(&self, id: i64, path: &str) {
        self.categories.write().unwrap().insert(id, path.to_string());
    }

    /// Snapshot of every audit record, oldest first.
    pub fn audit_records(&self) -> Vec<SyncAttemptRecord> {
        self.audit.read().unwrap().clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CorpusStore for InMemoryStore {
    async fn find_exact(
        &self,
        title_norm: &str,
        author_norm: &str,
    ) -> Result<Option<CorpusRecord>> {
        let records = self.records.read().unwrap();
        Ok(records
            .iter()
            .find(|r| normalize(&r.title) == title_norm && normalize(&r.author) == author_norm)
            .cloned())
    }

    async fn scan_tagged(&self) -> Result<Vec<CorpusRecord>> {
        let records = self.records.read().unwrap();
        Ok(records
            .iter()
            .filter(|r| !r.category.trim().is_empty() && !r.tags.is_empty())
            .cloned()
            .collect())
    }

    async fn insert_record(&self, record: &CorpusRecord) -> Result<()> {
        self.records.write().unwrap().push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl CategoryDirectory for InMemoryStore {
    async fn find_path(&self, category_id: i64) -> Result<Option<String>> {
        Ok(self.categories.read().unwrap().get(&category_id).cloned())
    }

    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<CategoryEntry>> {
        let kw = keyword.trim().to_lowercase();
        if kw.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let categories = self.categories.read().unwrap();
        let mut hits: Vec<CategoryEntry> = categories
            .iter()
            .filter(|(_, path)| path.to_lowercase().contains(&kw))
            .map(|(id, path)| CategoryEntry {
                category_id: *id,
                category: path.clone(),
            })
            .collect();
        hits.sort_by(|a, b| a.category.cmp(&b.category));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn insert_ignore(&self, entries: &[CategoryEntry]) -> Result<usize> {
        let mut categories = self.categories.write().unwrap();
        let mut inserted = 0;
        for e in entries {
            if !categories.contains_key(&e.category_id) {
                categories.insert(e.category_id, e.category.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

#[async_trait]
impl AuditStore for InMemoryStore {
    async fn append(&self, attempt: NewSyncAttempt) -> Result<SyncAttemptRecord> {
        let mut audit = self.audit.write().unwrap();
        let id = audit.len() as i64 + 1;
        let record = SyncAttemptRecord::from_new(id, attempt);
        audit.push(record.clone());
        Ok(record)
    }

    async fn list(&self, query: &AuditQuery) -> Result<Page<SyncAttemptRecord>> {
        let q = query.normalized();
        let audit = self.audit.read().unwrap();
        let matching: Vec<&SyncAttemptRecord> =
            audit.iter().rev().filter(|r| q.matches(r)).collect();
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(q.page.saturating_mul(q.size))
            .take(q.size)
            .cloned()
            .collect();
        Ok(Page {
            items,
            page: q.page,
            size: q.size,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncOutcome;
    use chrono::Utc;

    fn attempt(account: i64, title: &str) -> NewSyncAttempt {
        NewSyncAttempt {
            account_id: account,
            product_id: "1".into(),
            title: Some(title.into()),
            outcome: SyncOutcome::Failed,
            message: "m".into(),
            payload_json: "{}".into(),
            response_json: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_audit_list_filters_and_orders_newest_first() {
        let store = InMemoryStore::new();
        store.append(attempt(1, "Rails of Aotearoa")).await.unwrap();
        store.append(attempt(2, "Pacific Tides")).await.unwrap();
        store.append(attempt(1, "Desert Tracks")).await.unwrap();

        let page = store
            .list(&AuditQuery {
                account_id: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].title.as_deref(), Some("Desert Tracks"));

        let page = store
            .list(&AuditQuery {
                title: Some("pacific".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].account_id, 2);

        let page = store
            .list(&AuditQuery {
                id: Some(1),
                account_id: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, 1);
    }

    #[tokio::test]
    async fn test_audit_list_page_past_the_end_is_empty() {
        let store = InMemoryStore::new();
        store.append(attempt(1, "Rails of Aotearoa")).await.unwrap();

        let page = store
            .list(&AuditQuery {
                page: usize::MAX / 2,
                size: 20,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(page.items.is_empty());
        assert_eq!(page.page, usize::MAX / 2);
    }

    #[tokio::test]
    async fn test_directory_search_and_insert_ignore() {
        let store = InMemoryStore::new();
        let n = store
            .insert_ignore(&[
                CategoryEntry {
                    category_id: 3,
                    category: "Books ~ Travel".into(),
                },
                CategoryEntry {
                    category_id: 1,
                    category: "Books ~ Rail".into(),
                },
                CategoryEntry {
                    category_id: 3,
                    category: "dup".into(),
                },
            ])
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(store.find_path(3).await.unwrap().as_deref(), Some("Books ~ Travel"));

        let hits = store.search("BOOKS", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].category, "Books ~ Rail");
        assert!(store.search("  ", 10).await.unwrap().is_empty());
    }
}
