use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use reqwest::Client;
use teloxide::{prelude::*, types::Recipient};
use tokio::{task::JoinHandle, time::timeout};

use crate::{
    config::AppConfig,
    db::{self, seen::SeenRepository},
    domain::QueueItem,
    feeds::FeedFetcher,
    infrastructure::{directories::ResolvedPaths, notifier::notify_admin_group, shutdown::Shutdown},
    render::CardRenderer,
    tasks::{
        queue::DeliveryQueue,
        scanner::FeedScanner,
        worker::{DeliveryStats, DeliveryWorker},
    },
    telegram::{StatsProvider, TelegramSender, TelegramService},
};

pub struct NewsBotApp {
    scanner_handle: JoinHandle<()>,
    worker_handle: JoinHandle<()>,
    telegram: TelegramService,
    queue: Arc<DeliveryQueue<QueueItem>>,
    seen: Arc<SeenRepository>,
    shutdown: Shutdown,
    config: Arc<AppConfig>,
    bot: Bot,
}

impl NewsBotApp {
    pub async fn initialize(
        config: AppConfig,
        paths: ResolvedPaths,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let config = Arc::new(config);

        // novelty tracking is the core correctness guarantee; failing to
        // open the store is fatal
        let pool = db::init_pool(&paths.db_path).await?;
        let seen = Arc::new(SeenRepository::new(pool));

        let http_client = Client::builder()
            .user_agent(format!("newsflash-bot/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.scanner.fetch_timeout)
            .connect_timeout(config.scanner.connect_timeout)
            .build()?;

        let bot = Bot::new(&config.telegram_bot_token);
        let queue = Arc::new(DeliveryQueue::new(config.delivery.queue_capacity));
        let stats = Arc::new(DeliveryStats::new());

        let renderer = CardRenderer::new(&config.render)?;
        let sender = TelegramSender::new(bot.clone(), parse_channel(&config.channel_id)?);

        let scanner = Arc::new(FeedScanner::new(
            FeedFetcher::new(http_client),
            seen.clone(),
            queue.clone(),
            config.clone(),
        ));
        let scanner_handle = scanner.spawn(shutdown.subscribe());

        let worker = Arc::new(DeliveryWorker::new(
            queue.clone(),
            sender,
            renderer,
            config.delivery.clone(),
            stats.clone(),
        ));
        let worker_handle = worker.spawn(shutdown.subscribe());

        let stats_provider: StatsProvider = {
            let queue = queue.clone();
            let stats = stats.clone();
            Arc::new(move || stats.snapshot(queue.len()))
        };
        let telegram = TelegramService::new(bot.clone(), config.clone(), stats_provider);

        Ok(Self {
            scanner_handle,
            worker_handle,
            telegram,
            queue,
            seen,
            shutdown,
            config,
            bot,
        })
    }

    pub async fn run(self) -> Result<()> {
        let NewsBotApp {
            scanner_handle,
            worker_handle,
            telegram,
            queue,
            seen,
            shutdown,
            config,
            bot,
        } = self;

        tracing::info!(
            feeds = config.feeds.len(),
            interval_secs = config.scanner.interval.as_secs(),
            "news card bot started"
        );
        notify_admin_group(&bot, config.as_ref(), "News card bot started.").await;

        let mut shutdown_listener = shutdown.subscribe();
        let shutdown_timeout = Duration::from_secs(5);
        let mut telegram_future = Box::pin(telegram.run(shutdown.subscribe()));
        let mut telegram_completed = false;

        tokio::select! {
            _ = shutdown_listener.notified() => {
                tracing::info!("shutdown signal received");
            }
            res = &mut telegram_future => {
                telegram_completed = true;
                if let Err(err) = res {
                    tracing::error!(?err, "telegram dispatcher exited with error");
                } else {
                    tracing::info!("telegram dispatcher exited");
                }
            }
        }

        shutdown.trigger();
        // no further pushes; the worker finishes its in-flight item and stops
        queue.close();

        if !telegram_completed {
            match timeout(shutdown_timeout, &mut telegram_future).await {
                Ok(Err(err)) => {
                    tracing::error!(?err, "telegram dispatcher exited with error");
                }
                Ok(Ok(())) => {}
                Err(_) => {
                    tracing::warn!(
                        target: "telegram",
                        "dispatcher did not stop within {:?}; abandoning it",
                        shutdown_timeout
                    );
                }
            }
        }

        join_task("scanner", scanner_handle, shutdown_timeout).await;
        join_task("worker", worker_handle, shutdown_timeout).await;

        if timeout(shutdown_timeout, seen.close()).await.is_err() {
            tracing::warn!(
                target: "db",
                "dedup store did not close within {:?}",
                shutdown_timeout
            );
        }

        tracing::info!("news card bot stopped");
        notify_admin_group(&bot, config.as_ref(), "News card bot stopped.").await;
        Ok(())
    }
}

async fn join_task(name: &str, handle: JoinHandle<()>, wait: Duration) {
    tokio::pin!(handle);
    match timeout(wait, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            if err.is_panic() {
                tracing::error!(target: "lifecycle", task = name, "task ended in a panic");
            }
        }
        Err(_) => {
            tracing::warn!(
                target: "lifecycle",
                task = name,
                "task did not stop within {:?}; aborting it",
                wait
            );
            handle.abort();
        }
    }
}

fn parse_channel(raw: &str) -> Result<Recipient> {
    if raw.starts_with('@') {
        return Ok(Recipient::ChannelUsername(raw.to_string()));
    }
    raw.parse::<i64>()
        .map(|id| Recipient::Id(ChatId(id)))
        .map_err(|_| anyhow!("invalid TELEGRAM_CHANNEL_ID: {raw}"))
}
