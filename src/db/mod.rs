use std::{path::Path, str::FromStr, time::Duration};

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

pub mod seen;

pub async fn init_pool(db_path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5))
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

pub(crate) async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // seen_at is stored as unix epoch seconds so window comparisons are
    // plain integer comparisons regardless of formatting
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sent_articles (
            content_hash TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            title TEXT NOT NULL,
            dedup_title TEXT NOT NULL,
            link TEXT NOT NULL,
            published_at TEXT,
            seen_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sent_articles_dedup_title
            ON sent_articles(dedup_title, seen_at)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
