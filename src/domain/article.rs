use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::text;

/// A single discovered feed entry with identity and provenance.
#[derive(Debug, Clone)]
pub struct Article {
    /// Feed-assigned identifier when present, otherwise the entry link.
    pub source_id: String,
    /// Raw title as fetched.
    pub title: String,
    /// Display form produced by the text normalizer.
    pub normalized_title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Assigned at discovery.
    pub fetched_at: DateTime<Utc>,
    /// Primary dedup key: digest over the (title, link, published_at) triple.
    pub content_hash: String,
}

impl Article {
    pub fn new(
        source_id: Option<String>,
        title: String,
        link: String,
        published_at: Option<DateTime<Utc>>,
    ) -> Self {
        let normalized_title = text::normalize_title(&title);
        let content_hash = content_hash(&title, &link, published_at);
        Self {
            source_id: source_id.unwrap_or_else(|| link.clone()),
            title,
            normalized_title,
            link,
            published_at,
            fetched_at: Utc::now(),
            content_hash,
        }
    }

    /// Secondary dedup key over the normalized title.
    pub fn dedup_title(&self) -> String {
        text::dedup_key(&self.normalized_title)
    }
}

/// Deterministic for identical (title, link, published_at) triples; two
/// articles with equal hashes are the same article.
pub fn content_hash(title: &str, link: &str, published_at: Option<DateTime<Utc>>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(link.as_bytes());
    hasher.update(b"\n");
    if let Some(ts) = published_at {
        hasher.update(ts.to_rfc3339().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
