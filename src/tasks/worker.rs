use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::sleep};

use crate::{
    config::DeliveryConfig,
    domain::{DeliveryState, QueueItem, StatsSnapshot},
    infrastructure::shutdown::ShutdownListener,
    render::RenderCard,
    tasks::queue::DeliveryQueue,
    telegram::sender::{CardSender, SendError},
};

/// Counters mutated only by the worker, readable from the status command
/// path while the loop runs.
#[derive(Debug)]
pub struct DeliveryStats {
    total_sent: AtomicU64,
    total_failed: AtomicU64,
    started_at: Instant,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self {
            total_sent: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    fn record_sent(&self) {
        self.total_sent.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failed(&self) {
        self.total_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queue_depth: usize) -> StatsSnapshot {
        StatsSnapshot {
            queue_depth,
            total_sent: self.total_sent.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

/// Consumer half of the pipeline: drains the delivery queue, renders a card
/// per article and pushes it to the messaging platform, pacing itself around
/// flood control.
pub struct DeliveryWorker<S, R> {
    queue: Arc<DeliveryQueue<QueueItem>>,
    sender: S,
    renderer: R,
    config: DeliveryConfig,
    stats: Arc<DeliveryStats>,
}

impl<S: CardSender, R: RenderCard> DeliveryWorker<S, R> {
    pub fn new(
        queue: Arc<DeliveryQueue<QueueItem>>,
        sender: S,
        renderer: R,
        config: DeliveryConfig,
        stats: Arc<DeliveryStats>,
    ) -> Self {
        Self {
            queue,
            sender,
            renderer,
            config,
            stats,
        }
    }

    pub fn spawn(self: Arc<Self>, mut shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop(&mut shutdown).await;
        })
    }

    async fn run_loop(&self, shutdown: &mut ShutdownListener) {
        loop {
            let item = tokio::select! {
                popped = self.queue.pop() => match popped {
                    Some(item) => item,
                    None => break,
                },
                _ = shutdown.notified() => break,
            };
            self.deliver(item, shutdown).await;
        }
        tracing::info!(target: "worker", "delivery worker stopped");
    }

    pub(crate) async fn deliver(&self, mut item: QueueItem, shutdown: &mut ShutdownListener) {
        item.state = DeliveryState::Rendering;
        let png = match self.renderer.render(&item.article).await {
            Ok(png) => png,
            Err(err) => {
                // render failures are deterministic; retrying cannot help
                item.state = DeliveryState::Dropped;
                self.stats.record_failed();
                tracing::error!(
                    target: "worker",
                    error = %err,
                    title = %item.article.normalized_title,
                    "render failed; dropping article"
                );
                return;
            }
        };

        item.state = DeliveryState::Sending;
        let outcome = self
            .sender
            .send(&item.article.normalized_title, &item.article.link, &png)
            .await;

        match outcome {
            Ok(()) => {
                item.state = DeliveryState::Delivered;
                self.stats.record_sent();
                tracing::info!(
                    target: "worker",
                    title = %item.article.normalized_title,
                    attempts = item.attempts,
                    "article delivered"
                );
                self.pause(self.config.min_send_gap, shutdown).await;
            }
            Err(SendError::RateLimited { retry_after }) => {
                let wait = retry_after.unwrap_or_else(|| self.backoff(item.attempts));
                tracing::warn!(
                    target: "worker",
                    wait_secs = wait.as_secs(),
                    title = %item.article.normalized_title,
                    "rate limited; pausing deliveries and retrying"
                );
                item.retry();
                self.queue.push_front(item);
                // flood control is global, so the whole worker waits;
                // any other item sent now would be throttled too
                self.pause(wait, shutdown).await;
            }
            Err(SendError::Transient(reason)) => {
                item.attempts += 1;
                if item.attempts >= self.config.max_attempts {
                    item.state = DeliveryState::Dropped;
                    self.stats.record_failed();
                    tracing::error!(
                        target: "worker",
                        error = %reason,
                        attempts = item.attempts,
                        title = %item.article.normalized_title,
                        "retries exhausted; dropping article"
                    );
                } else {
                    tracing::warn!(
                        target: "worker",
                        error = %reason,
                        attempts = item.attempts,
                        title = %item.article.normalized_title,
                        "transient send failure; retrying"
                    );
                    item.state = DeliveryState::Queued;
                    self.queue.push_front(item);
                    self.pause(self.config.retry_delay, shutdown).await;
                }
            }
            Err(SendError::Permanent(reason)) => {
                item.state = DeliveryState::Dropped;
                self.stats.record_failed();
                tracing::error!(
                    target: "worker",
                    error = %reason,
                    title = %item.article.normalized_title,
                    "permanent send failure; dropping article"
                );
            }
        }
    }

    fn backoff(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts.min(16));
        self.config
            .backoff_base
            .saturating_mul(factor)
            .min(self.config.backoff_cap)
    }

    async fn pause(&self, wait: Duration, shutdown: &mut ShutdownListener) {
        if wait.is_zero() {
            return;
        }
        tokio::select! {
            _ = sleep(wait) => {}
            _ = shutdown.notified() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use parking_lot::Mutex;

    use super::*;
    use crate::{
        domain::Article,
        infrastructure::shutdown::Shutdown,
        render::RenderError,
    };

    struct ScriptedSender {
        script: Mutex<VecDeque<Result<(), SendError>>>,
        sent: Mutex<Vec<String>>,
    }

    impl ScriptedSender {
        fn new(script: Vec<Result<(), SendError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent_captions(&self) -> Vec<String> {
            self.sent.lock().clone()
        }
    }

    impl CardSender for Arc<ScriptedSender> {
        async fn send(&self, caption: &str, _link: &str, _png: &[u8]) -> Result<(), SendError> {
            let next = self.script.lock().pop_front().unwrap_or(Ok(()));
            if next.is_ok() {
                self.sent.lock().push(caption.to_string());
            }
            next
        }
    }

    struct StubRenderer {
        fail: bool,
    }

    impl RenderCard for StubRenderer {
        async fn render(&self, _article: &Article) -> Result<Vec<u8>, RenderError> {
            if self.fail {
                Err(RenderError::FontUnavailable { tried: 0 })
            } else {
                Ok(vec![0u8; 8])
            }
        }
    }

    fn item(title: &str) -> QueueItem {
        QueueItem::new(Article::new(
            None,
            title.to_string(),
            format!("https://e.com/{title}"),
            None,
        ))
    }

    fn test_config() -> DeliveryConfig {
        DeliveryConfig {
            queue_capacity: 16,
            max_attempts: 3,
            retry_delay: Duration::from_millis(0),
            backoff_base: Duration::from_millis(0),
            backoff_cap: Duration::from_millis(0),
            min_send_gap: Duration::from_millis(0),
        }
    }

    fn worker(
        script: Vec<Result<(), SendError>>,
        fail_render: bool,
    ) -> (
        DeliveryWorker<Arc<ScriptedSender>, StubRenderer>,
        Arc<ScriptedSender>,
        Arc<DeliveryQueue<QueueItem>>,
        Arc<DeliveryStats>,
    ) {
        let queue = Arc::new(DeliveryQueue::new(16));
        let stats = Arc::new(DeliveryStats::new());
        let sender = Arc::new(ScriptedSender::new(script));
        let worker = DeliveryWorker::new(
            queue.clone(),
            sender.clone(),
            StubRenderer { fail: fail_render },
            test_config(),
            stats.clone(),
        );
        (worker, sender, queue, stats)
    }

    /// Drains the queue through `deliver` until it is empty.
    async fn drain(
        worker: &DeliveryWorker<Arc<ScriptedSender>, StubRenderer>,
        queue: &DeliveryQueue<QueueItem>,
    ) {
        let (_, mut listener) = Shutdown::new();
        while let Some(next) = {
            let inner = queue.len();
            if inner == 0 {
                None
            } else {
                queue.pop().await
            }
        } {
            worker.deliver(next, &mut listener).await;
        }
    }

    #[tokio::test]
    async fn successful_delivery_updates_stats() {
        let (worker, sender, queue, stats) = worker(vec![Ok(())], false);
        queue.push(item("Story")).unwrap();
        drain(&worker, &queue).await;

        let snapshot = stats.snapshot(queue.len());
        assert_eq!(snapshot.total_sent, 1);
        assert_eq!(snapshot.total_failed, 0);
        assert_eq!(snapshot.queue_depth, 0);
        assert_eq!(sender.sent_captions(), vec!["Story".to_string()]);
    }

    #[tokio::test]
    async fn rate_limited_item_is_requeued_front_and_keeps_order() {
        let (worker, sender, queue, stats) = worker(
            vec![
                Err(SendError::RateLimited {
                    retry_after: Some(Duration::from_millis(0)),
                }),
                Ok(()),
                Ok(()),
                Ok(()),
            ],
            false,
        );
        queue.push(item("I1")).unwrap();
        queue.push(item("I2")).unwrap();
        queue.push(item("I3")).unwrap();
        drain(&worker, &queue).await;

        assert_eq!(
            sender.sent_captions(),
            vec!["I1".to_string(), "I2".to_string(), "I3".to_string()]
        );
        assert_eq!(stats.snapshot(0).total_sent, 3);
        // rate limiting is pacing, not failure
        assert_eq!(stats.snapshot(0).total_failed, 0);
    }

    #[tokio::test]
    async fn transient_failures_drop_after_max_attempts() {
        let (worker, sender, queue, stats) = worker(
            vec![
                Err(SendError::Transient("timeout".into())),
                Err(SendError::Transient("timeout".into())),
                Err(SendError::Transient("timeout".into())),
            ],
            false,
        );
        queue.push(item("Flaky")).unwrap();
        drain(&worker, &queue).await;

        assert!(sender.sent_captions().is_empty());
        let snapshot = stats.snapshot(queue.len());
        assert_eq!(snapshot.total_failed, 1);
        assert_eq!(snapshot.total_sent, 0);
        assert_eq!(snapshot.queue_depth, 0);
    }

    #[tokio::test]
    async fn transient_failure_then_success_is_delivered() {
        let (worker, sender, queue, stats) = worker(
            vec![Err(SendError::Transient("reset".into())), Ok(())],
            false,
        );
        queue.push(item("Recovers")).unwrap();
        drain(&worker, &queue).await;

        assert_eq!(sender.sent_captions(), vec!["Recovers".to_string()]);
        assert_eq!(stats.snapshot(0).total_failed, 0);
    }

    #[tokio::test]
    async fn permanent_failure_drops_immediately() {
        let (worker, sender, queue, stats) = worker(
            vec![Err(SendError::Permanent("rejected payload".into()))],
            false,
        );
        queue.push(item("Bad")).unwrap();
        drain(&worker, &queue).await;

        assert!(sender.sent_captions().is_empty());
        assert_eq!(stats.snapshot(0).total_failed, 1);
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn render_failure_is_not_retried() {
        let (worker, sender, queue, stats) = worker(vec![], true);
        queue.push(item("Unrenderable")).unwrap();
        drain(&worker, &queue).await;

        assert!(sender.sent_captions().is_empty());
        assert_eq!(stats.snapshot(0).total_failed, 1);
        assert_eq!(queue.len(), 0);
    }
}
