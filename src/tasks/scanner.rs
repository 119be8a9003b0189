use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use tokio::{task::JoinHandle, time::sleep};

use crate::{
    config::AppConfig,
    db::seen::SeenRepository,
    domain::{Article, QueueItem},
    feeds::{FeedFetcher, RawEntry},
    infrastructure::shutdown::ShutdownListener,
    tasks::queue::DeliveryQueue,
};

/// Producer half of the pipeline: polls the configured feeds on a fixed
/// interval and hands fresh articles to the delivery queue.
pub struct FeedScanner {
    fetcher: FeedFetcher,
    seen: Arc<SeenRepository>,
    queue: Arc<DeliveryQueue<QueueItem>>,
    config: Arc<AppConfig>,
}

impl FeedScanner {
    pub fn new(
        fetcher: FeedFetcher,
        seen: Arc<SeenRepository>,
        queue: Arc<DeliveryQueue<QueueItem>>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            fetcher,
            seen,
            queue,
            config,
        }
    }

    pub fn spawn(self: Arc<Self>, mut shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop(&mut shutdown).await;
        })
    }

    async fn run_loop(&self, shutdown: &mut ShutdownListener) {
        // first scan runs immediately, then on the fixed interval
        loop {
            if shutdown.is_triggered() {
                break;
            }
            self.scan_cycle().await;
            self.log_next_scan();
            tokio::select! {
                _ = sleep(self.config.scanner.interval) => {}
                _ = shutdown.notified() => break,
            }
        }
        tracing::info!(target: "scanner", "feed scanner stopped");
    }

    async fn scan_cycle(&self) {
        for feed in &self.config.feeds {
            let entries = match self.fetcher.fetch(feed).await {
                Ok(entries) => entries,
                Err(err) => {
                    // cycle skipped for this feed, nothing marked seen
                    tracing::warn!(
                        target: "scanner",
                        feed = %feed.name,
                        error = %err,
                        "feed fetch failed; skipping this cycle"
                    );
                    continue;
                }
            };
            let queued = self.process_entries(&feed.name, entries).await;
            if queued > 0 {
                tracing::info!(target: "scanner", feed = %feed.name, queued, "queued fresh articles");
            }
        }
    }

    /// Oldest-first, capped per cycle. Stale entries are discarded before
    /// the cap is applied so a feed whose oldest entries are past the age
    /// cutoff cannot consume the whole cycle and starve fresh articles.
    /// Marking seen happens only after a successful push so a full queue
    /// never silently loses an article; it stays eligible for re-discovery
    /// on the next scan.
    pub(crate) async fn process_entries(&self, feed_name: &str, mut entries: Vec<RawEntry>) -> usize {
        let max_age = chrono::Duration::from_std(self.config.scanner.max_entry_age)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        let now = Utc::now();
        entries.retain(|entry| match entry.published {
            Some(published) => now.signed_duration_since(published) <= max_age,
            None => true,
        });
        entries.sort_by_key(|entry| entry.published);
        entries.truncate(self.config.scanner.max_per_cycle);

        let mut queued = 0usize;
        for entry in entries {
            let article = Article::new(entry.id, entry.title, entry.link, entry.published);
            if !self
                .seen
                .is_novel(&article, self.config.dedup.title_window)
                .await
            {
                continue;
            }

            match self.queue.push(QueueItem::new(article.clone())) {
                Ok(()) => {
                    if let Err(err) = self.seen.mark_seen(&article).await {
                        tracing::error!(
                            target: "scanner",
                            error = %err,
                            hash = %article.content_hash,
                            "failed to record seen article"
                        );
                    }
                    queued += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        target: "scanner",
                        feed = %feed_name,
                        error = %err,
                        title = %article.normalized_title,
                        "queue full; dropping article for this cycle"
                    );
                }
            }
        }
        queued
    }

    fn log_next_scan(&self) {
        let tz: Tz = self
            .config
            .timezone
            .parse()
            .unwrap_or(chrono_tz::Asia::Kolkata);
        let interval =
            chrono::Duration::from_std(self.config.scanner.interval).unwrap_or_default();
        let next_scan = Utc::now().with_timezone(&tz) + interval;
        tracing::info!(
            target: "scanner",
            next_scan = %next_scan.format("%H:%M:%S"),
            "sleeping until next scan"
        );
    }
}
