use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;

use crate::domain::Article;

/// Persisted record of articles already queued or delivered.
///
/// Novelty is a two-key check: the content hash catches exact re-fetches, and
/// the folded title within a trailing window catches feeds that republish the
/// same story with a reformatted link or timestamp (which changes the hash
/// but not the headline).
#[derive(Clone)]
pub struct SeenRepository {
    pool: SqlitePool,
}

impl SeenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Fails closed: on a storage error the article is reported as already
    /// seen, trading a possibly missed post for never sending a duplicate.
    pub async fn is_novel(&self, article: &Article, title_window: Duration) -> bool {
        match self.check_novel(article, title_window).await {
            Ok(novel) => novel,
            Err(err) => {
                tracing::warn!(
                    target: "dedup",
                    error = %err,
                    hash = %article.content_hash,
                    "novelty check failed; treating article as seen"
                );
                false
            }
        }
    }

    async fn check_novel(&self, article: &Article, title_window: Duration) -> Result<bool> {
        if self.contains_hash(&article.content_hash).await? {
            return Ok(false);
        }
        let cutoff = window_cutoff(title_window);
        let duplicate: Option<(i64,)> = sqlx::query_as(
            r#"SELECT 1 FROM sent_articles WHERE dedup_title = ?1 AND seen_at >= ?2 LIMIT 1"#,
        )
        .bind(article.dedup_title())
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;
        Ok(duplicate.is_none())
    }

    pub async fn contains_hash(&self, content_hash: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as(r#"SELECT 1 FROM sent_articles WHERE content_hash = ?1"#)
                .bind(content_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Idempotent; inserting an existing content hash is a no-op.
    pub async fn mark_seen(&self, article: &Article) -> Result<()> {
        sqlx::query(
            r#"INSERT OR IGNORE INTO sent_articles
                (content_hash, source_id, title, dedup_title, link, published_at, seen_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
        )
        .bind(&article.content_hash)
        .bind(&article.source_id)
        .bind(&article.title)
        .bind(article.dedup_title())
        .bind(&article.link)
        .bind(article.published_at.map(|ts| ts.to_rfc3339()))
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Folded titles recorded within the trailing window, newest first.
    pub async fn recent_titles(&self, window: Duration) -> Result<Vec<String>> {
        let cutoff = window_cutoff(window);
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"SELECT dedup_title FROM sent_articles WHERE seen_at >= ?1 ORDER BY seen_at DESC"#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(title,)| title).collect())
    }

    pub async fn total_seen(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM sent_articles"#)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn window_cutoff(window: Duration) -> i64 {
    Utc::now().timestamp() - window.as_secs() as i64
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use sqlx::sqlite::SqliteConnectOptions;

    use super::*;

    const WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

    async fn memory_repo() -> SeenRepository {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePool::connect_with(options).await.unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        SeenRepository::new(pool)
    }

    fn article(title: &str, link: &str) -> Article {
        Article::new(None, title.to_string(), link.to_string(), None)
    }

    #[tokio::test]
    async fn unseen_article_is_novel() {
        let repo = memory_repo().await;
        assert!(repo.is_novel(&article("Fresh story", "https://e.com/1"), WINDOW).await);
    }

    #[tokio::test]
    async fn seen_hash_is_not_novel() {
        let repo = memory_repo().await;
        let a = article("Story", "https://e.com/1");
        repo.mark_seen(&a).await.unwrap();
        assert!(!repo.is_novel(&a, WINDOW).await);
    }

    #[tokio::test]
    async fn same_title_different_link_is_not_novel_within_window() {
        let repo = memory_repo().await;
        repo.mark_seen(&article("Markets Rally Today", "https://e.com/1"))
            .await
            .unwrap();
        // republished with a new link: hash differs, folded title matches
        let republished = article("Markets  rally today", "https://e.com/1?ref=republish");
        assert_ne!(
            republished.content_hash,
            article("Markets Rally Today", "https://e.com/1").content_hash
        );
        assert!(!repo.is_novel(&republished, WINDOW).await);
    }

    #[tokio::test]
    async fn title_outside_window_is_novel_again() {
        let repo = memory_repo().await;
        let old = article("Old headline", "https://e.com/old");
        repo.mark_seen(&old).await.unwrap();
        // age the record past the window
        sqlx::query("UPDATE sent_articles SET seen_at = ?1")
            .bind(Utc::now().timestamp() - 48 * 60 * 60)
            .execute(&repo.pool)
            .await
            .unwrap();
        let republished = article("Old headline", "https://e.com/old-redirect");
        assert!(repo.is_novel(&republished, WINDOW).await);
    }

    #[tokio::test]
    async fn mark_seen_is_idempotent() {
        let repo = memory_repo().await;
        let a = article("Once", "https://e.com/once");
        repo.mark_seen(&a).await.unwrap();
        repo.mark_seen(&a).await.unwrap();
        assert_eq!(repo.total_seen().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn recent_titles_honours_window() {
        let repo = memory_repo().await;
        repo.mark_seen(&article("Inside Window", "https://e.com/a"))
            .await
            .unwrap();
        let titles = repo.recent_titles(WINDOW).await.unwrap();
        assert_eq!(titles, vec!["inside window".to_string()]);

        sqlx::query("UPDATE sent_articles SET seen_at = ?1")
            .bind(Utc::now().timestamp() - 2 * 24 * 60 * 60)
            .execute(&repo.pool)
            .await
            .unwrap();
        assert!(repo.recent_titles(WINDOW).await.unwrap().is_empty());
    }
}
