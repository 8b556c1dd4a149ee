use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Reference corpus. Tags are a JSON array in stored order.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            book_title TEXT NOT NULL,
            book_author TEXT NOT NULL DEFAULT '',
            category_path TEXT NOT NULL DEFAULT '',
            tags_json TEXT NOT NULL DEFAULT '[]',
            normalized_title TEXT NOT NULL,
            normalized_author TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS category_directory (
            category_id INTEGER PRIMARY KEY,
            category_path TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Insert-only audit log of commit attempts.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL,
            product_id TEXT NOT NULL,
            title TEXT,
            status TEXT NOT NULL,
            message TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            response_json TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_books_normalized ON books(normalized_title, normalized_author)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_records_account ON sync_records(account_id)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
