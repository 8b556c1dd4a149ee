//! SQLite-backed implementations of the core store traits.
//!
//! One [`SqliteStore`] serves all three roles against the schema created by
//! [`migrate`](crate::migrate): `books` for the corpus, `category_directory`
//! for category ids, and `sync_records` for the audit log.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use shelfmark_core::models::{
    CategoryEntry, CorpusRecord, NewSyncAttempt, SyncAttemptRecord, SyncOutcome,
};
use shelfmark_core::normalize::normalize;
use shelfmark_core::store::{
    AuditQuery, AuditStore, CategoryDirectory, CorpusStore, Page, MAX_PAGE_SIZE,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Decode a stored tag list; anything but a JSON string array reads as empty.
fn parse_tags(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

fn row_to_record(row: &SqliteRow) -> CorpusRecord {
    let tags_json: String = row.get("tags_json");
    CorpusRecord {
        title: row.get("book_title"),
        author: row.get("book_author"),
        category: row.get("category_path"),
        tags: parse_tags(&tags_json),
    }
}

fn row_to_attempt(row: &SqliteRow) -> Result<SyncAttemptRecord> {
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    Ok(SyncAttemptRecord {
        id: row.get("id"),
        account_id: row.get("account_id"),
        product_id: row.get("product_id"),
        title: row.get("title"),
        outcome: SyncOutcome::parse(&status)
            .with_context(|| format!("unknown sync status: {}", status))?,
        message: row.get("message"),
        payload_json: row.get("payload_json"),
        response_json: row.get("response_json"),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .with_context(|| format!("bad created_at: {}", created_at))?
            .with_timezone(&Utc),
    })
}

#[async_trait]
impl CorpusStore for SqliteStore {
    async fn find_exact(
        &self,
        title_norm: &str,
        author_norm: &str,
    ) -> Result<Option<CorpusRecord>> {
        let row = sqlx::query(
            r#"
            SELECT book_title, book_author, category_path, tags_json
            FROM books
            WHERE normalized_title = ? AND normalized_author = ?
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(title_norm)
        .bind(author_norm)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_record))
    }

    async fn scan_tagged(&self) -> Result<Vec<CorpusRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT book_title, book_author, category_path, tags_json
            FROM books
            WHERE TRIM(category_path) <> '' AND tags_json <> '[]'
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(row_to_record)
            .filter(|r| !r.tags.is_empty())
            .collect())
    }

    async fn insert_record(&self, record: &CorpusRecord) -> Result<()> {
        let tags_json = serde_json::to_string(&record.tags)?;
        sqlx::query(
            r#"
            INSERT INTO books (book_title, book_author, category_path, tags_json,
                               normalized_title, normalized_author)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.title)
        .bind(&record.author)
        .bind(&record.category)
        .bind(&tags_json)
        .bind(normalize(&record.title))
        .bind(normalize(&record.author))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CategoryDirectory for SqliteStore {
    async fn find_path(&self, category_id: i64) -> Result<Option<String>> {
        let path: Option<String> = sqlx::query_scalar(
            "SELECT category_path FROM category_directory WHERE category_id = ?",
        )
        .bind(category_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(path)
    }

    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<CategoryEntry>> {
        let kw = keyword.trim().to_lowercase();
        if kw.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.clamp(1, MAX_PAGE_SIZE) as i64;
        let rows = sqlx::query(
            r#"
            SELECT category_id, category_path
            FROM category_directory
            WHERE instr(LOWER(category_path), ?) > 0
            ORDER BY category_path
            LIMIT ?
            "#,
        )
        .bind(&kw)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| CategoryEntry {
                category_id: r.get("category_id"),
                category: r.get("category_path"),
            })
            .collect())
    }

    async fn insert_ignore(&self, entries: &[CategoryEntry]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for e in entries {
            let res = sqlx::query(
                "INSERT OR IGNORE INTO category_directory (category_id, category_path) VALUES (?, ?)",
            )
            .bind(e.category_id)
            .bind(&e.category)
            .execute(&mut *tx)
            .await?;
            inserted += res.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(inserted)
    }
}

#[async_trait]
impl AuditStore for SqliteStore {
    async fn append(&self, attempt: NewSyncAttempt) -> Result<SyncAttemptRecord> {
        let res = sqlx::query(
            r#"
            INSERT INTO sync_records (account_id, product_id, title, status, message,
                                      payload_json, response_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt.account_id)
        .bind(&attempt.product_id)
        .bind(&attempt.title)
        .bind(attempt.outcome.as_str())
        .bind(&attempt.message)
        .bind(&attempt.payload_json)
        .bind(&attempt.response_json)
        .bind(attempt.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(SyncAttemptRecord::from_new(res.last_insert_rowid(), attempt))
    }

    async fn list(&self, query: &AuditQuery) -> Result<Page<SyncAttemptRecord>> {
        let q = query.normalized();
        // A record id overrides every other filter.
        let (account, title) = if q.id.is_some() {
            (None, None)
        } else {
            (q.account_id, q.title.as_ref().map(|t| t.to_lowercase()))
        };

        let filter = r#"
            WHERE (?1 IS NULL OR id = ?1)
              AND (?2 IS NULL OR account_id = ?2)
              AND (?3 IS NULL OR instr(LOWER(COALESCE(title, '')), ?3) > 0)
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM sync_records {}", filter))
            .bind(q.id)
            .bind(account)
            .bind(&title)
            .fetch_one(&self.pool)
            .await?;

        let offset = i64::try_from(q.page.saturating_mul(q.size)).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            "SELECT * FROM sync_records {} ORDER BY id DESC LIMIT ?4 OFFSET ?5",
            filter
        ))
        .bind(q.id)
        .bind(account)
        .bind(&title)
        .bind(q.size as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let items = rows.iter().map(row_to_attempt).collect::<Result<Vec<_>>>()?;
        Ok(Page {
            items,
            page: q.page,
            size: q.size,
            total: total as usize,
        })
    }
}

/// Row counts for `shelf stats`.
pub struct TableCounts {
    pub books: i64,
    pub categories: i64,
    pub sync_records: i64,
    pub sync_failed: i64,
}

impl SqliteStore {
    pub async fn counts(&self) -> Result<TableCounts> {
        let books = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        let categories = sqlx::query_scalar("SELECT COUNT(*) FROM category_directory")
            .fetch_one(&self.pool)
            .await?;
        let sync_records = sqlx::query_scalar("SELECT COUNT(*) FROM sync_records")
            .fetch_one(&self.pool)
            .await?;
        let sync_failed = sqlx::query_scalar("SELECT COUNT(*) FROM sync_records WHERE status = 'FAILED'")
            .fetch_one(&self.pool)
            .await?;
        Ok(TableCounts {
            books,
            categories,
            sync_records,
            sync_failed,
        })
    }
}
