//! Storage abstraction for Shelfmark.
//!
//! Three narrow traits describe the persistent collaborators the core
//! pipeline needs, enabling pluggable backends (SQLite in the application
//! crate, in-memory here for tests):
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`CorpusStore`] | Reference corpus: exact lookup and bulk scan for the mapping cache |
//! | [`CategoryDirectory`] | Numeric category id → taxonomy path reference data |
//! | [`AuditStore`] | Append-only sync attempt log |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{CategoryEntry, CorpusRecord, NewSyncAttempt, SyncAttemptRecord};

/// Largest page size accepted by [`AuditStore::list`] and directory search.
pub const MAX_PAGE_SIZE: usize = 200;

/// Default page size for audit listings.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Read access to the reference corpus.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Find the record whose normalized title and author both equal the
    /// given (already normalized) values. Returns at most one record.
    async fn find_exact(&self, title_norm: &str, author_norm: &str)
        -> Result<Option<CorpusRecord>>;

    /// All records with a non-blank category and a non-empty tag list, in
    /// insertion order.
    async fn scan_tagged(&self) -> Result<Vec<CorpusRecord>>;

    /// Add a record. Used by seeding; the prediction path never writes.
    async fn insert_record(&self, record: &CorpusRecord) -> Result<()>;
}

/// Read access to the category reference directory.
#[async_trait]
pub trait CategoryDirectory: Send + Sync {
    /// Path for a category id, if the id is known.
    async fn find_path(&self, category_id: i64) -> Result<Option<String>>;

    /// Case-insensitive substring search on category paths, ordered by path.
    ///
    /// An empty keyword yields an empty list; `limit` is clamped to
    /// `[1, MAX_PAGE_SIZE]`.
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<CategoryEntry>>;

    /// Insert entries, ignoring ids that already exist. Returns the number
    /// actually inserted.
    async fn insert_ignore(&self, entries: &[CategoryEntry]) -> Result<usize>;
}

/// Filters for listing audit records.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub account_id: Option<i64>,
    pub id: Option<i64>,
    /// Case-insensitive substring of the display title.
    pub title: Option<String>,
    /// Zero-based page index.
    pub page: usize,
    pub size: usize,
}

impl AuditQuery {
    /// Clamp `size` into `[1, MAX_PAGE_SIZE]` (0 means the default) and
    /// drop a blank title filter.
    pub fn normalized(&self) -> AuditQuery {
        let size = match self.size {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };
        let title = self
            .title
            .as_ref()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        AuditQuery {
            account_id: self.account_id,
            id: self.id,
            title,
            page: self.page,
            size,
        }
    }

    /// Whether a record satisfies every filter (pagination aside).
    pub fn matches(&self, record: &SyncAttemptRecord) -> bool {
        if let Some(id) = self.id {
            return record.id == id;
        }
        if let Some(acc) = self.account_id {
            if record.account_id != acc {
                return false;
            }
        }
        if let Some(t) = &self.title {
            let needle = t.to_lowercase();
            match &record.title {
                Some(title) if title.to_lowercase().contains(&needle) => {}
                _ => return false,
            }
        }
        true
    }
}

/// One page of results, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

/// Append-only persistence for sync attempts.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist a new attempt and return it with its assigned id.
    async fn append(&self, attempt: NewSyncAttempt) -> Result<SyncAttemptRecord>;

    /// List records matching `query`, newest first.
    ///
    /// When `query.id` is set it takes precedence over every other filter.
    async fn list(&self, query: &AuditQuery) -> Result<Page<SyncAttemptRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_query_normalized_clamps() {
        let q = AuditQuery {
            size: 0,
            title: Some("   ".into()),
            ..Default::default()
        }
        .normalized();
        assert_eq!(q.size, DEFAULT_PAGE_SIZE);
        assert!(q.title.is_none());

        let q = AuditQuery {
            size: 10_000,
            ..Default::default()
        }
        .normalized();
        assert_eq!(q.size, MAX_PAGE_SIZE);
    }
}
