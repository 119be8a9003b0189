use std::io::Cursor;

use chrono::{DateTime, Utc};
use feed_rs::parser;
use reqwest::{header, Client, StatusCode};
use thiserror::Error;

use crate::config::FeedConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: StatusCode },
    #[error("failed to parse feed body from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: parser::ParseFeedError,
    },
}

/// A feed entry as fetched, before identity is assigned.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub id: Option<String>,
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
}

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetches and parses one feed. Cache-defeating headers keep upstream
    /// proxies from answering with a stale copy between scan ticks.
    pub async fn fetch(&self, feed: &FeedConfig) -> Result<Vec<RawEntry>, FetchError> {
        let response = self
            .client
            .get(&feed.url)
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: feed.url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: feed.url.clone(),
                status,
            });
        }

        let body = response.bytes().await.map_err(|source| FetchError::Http {
            url: feed.url.clone(),
            source,
        })?;

        let parsed = parser::parse(Cursor::new(body)).map_err(|source| FetchError::Parse {
            url: feed.url.clone(),
            source,
        })?;

        let entries = parsed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let link = entry.links.first().map(|link| link.href.clone())?;
                let title = entry
                    .title
                    .as_ref()
                    .map(|text| text.content.clone())
                    .filter(|content| !content.trim().is_empty())?;
                let id = Some(entry.id).filter(|id| !id.is_empty());
                Some(RawEntry {
                    id,
                    title,
                    link,
                    published: entry.published.or(entry.updated),
                })
            })
            .collect();

        Ok(entries)
    }
}
