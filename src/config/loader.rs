use std::{env, fs, time::Duration};

use serde::Deserialize;

use super::env::{
    AppConfig, ConfigError, DedupConfig, DeliveryConfig, DirectoryConfig, FeedConfig,
    LoggingConfig, RenderConfig, ScannerConfig,
};

const DEFAULT_FEED_NAME: &str = "Stock News";
const DEFAULT_FEED_URL: &str =
    "https://economictimes.indiatimes.com/markets/stocks/news/rssfeeds/2146843.cms";

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

#[derive(Debug, Deserialize)]
struct FeedsFile {
    feeds: Vec<FeedConfig>,
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?;
        let channel_id = env::var("TELEGRAM_CHANNEL_ID")
            .map_err(|_| ConfigError::Missing("TELEGRAM_CHANNEL_ID"))?;
        if !channel_id.starts_with('@') && channel_id.parse::<i64>().is_err() {
            return Err(ConfigError::Invalid {
                key: "TELEGRAM_CHANNEL_ID",
                value: channel_id,
            });
        }
        let admin_group_id = parse_int("ADMIN_GROUP_ID");

        let feeds = load_feeds(
            &env::var("FEEDS_FILE").unwrap_or_else(|_| "feeds.json".to_string()),
        );

        let scanner = ScannerConfig {
            interval: minutes_var("CHECK_INTERVAL_MINUTES", 5),
            max_per_cycle: usize_var("MAX_ARTICLES_PER_CHECK", 5),
            max_entry_age: hours_var("MAX_ENTRY_AGE_HOURS", 24),
            fetch_timeout: secs_var("FETCH_TIMEOUT_SECONDS", 60),
            connect_timeout: secs_var("CONNECT_TIMEOUT_SECONDS", 30),
        };

        let max_per_cycle = scanner.max_per_cycle;
        let delivery = DeliveryConfig {
            // proportional to items-per-scan-cycle by default
            queue_capacity: usize_var("QUEUE_CAPACITY", max_per_cycle.saturating_mul(4).max(8)),
            max_attempts: u32_var("MAX_RETRIES", 3),
            retry_delay: secs_var("RETRY_DELAY_SECONDS", 5),
            backoff_base: secs_var("BACKOFF_BASE_SECONDS", 5),
            backoff_cap: secs_var("BACKOFF_CAP_SECONDS", 120),
            min_send_gap: secs_var("MIN_INTERVAL_SECONDS", 4),
        };

        let dedup = DedupConfig {
            title_window: hours_var("DEDUP_TITLE_WINDOW_HOURS", 24),
        };

        let render = RenderConfig {
            width: u32_var("IMAGE_WIDTH", 1200),
            height: u32_var("IMAGE_HEIGHT", 675),
            brand: env::var("CARD_BRAND").unwrap_or_else(|_| "Live Market Updates".to_string()),
            font_paths: env::var("CARD_FONTS")
                .map(|value| {
                    value
                        .split(';')
                        .map(|part| part.trim().to_string())
                        .filter(|part| !part.is_empty())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_else(|_| default_font_paths()),
        };

        let directories = DirectoryConfig {
            logs_dir: env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string()),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            db_filename: env::var("DB_FILENAME").unwrap_or_else(|_| "news_tracker.db".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        let timezone = env::var("BOT_TIMEZONE").unwrap_or_else(|_| "Asia/Kolkata".to_string());

        Ok(Self {
            telegram_bot_token,
            channel_id,
            admin_group_id,
            feeds,
            scanner,
            delivery,
            dedup,
            render,
            directories,
            logging,
            timezone,
        })
    }
}

fn load_feeds(path: &str) -> Vec<FeedConfig> {
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<FeedsFile>(&contents) {
            Ok(file) if !file.feeds.is_empty() => return file.feeds,
            Ok(_) => {
                tracing::warn!(target: "config", path, "feeds file is empty; using default feed");
            }
            Err(err) => {
                tracing::warn!(
                    target: "config",
                    path,
                    error = %err,
                    "failed to parse feeds file; using default feed"
                );
            }
        },
        Err(_) => {}
    }
    vec![FeedConfig {
        name: DEFAULT_FEED_NAME.to_string(),
        url: DEFAULT_FEED_URL.to_string(),
    }]
}

fn default_font_paths() -> Vec<String> {
    [
        "assets/fonts/Inter-Bold.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    ]
    .iter()
    .map(|path| path.to_string())
    .collect()
}

fn parse_int(key: &str) -> Option<i64> {
    env::var(key).ok().and_then(|value| value.parse::<i64>().ok())
}

fn usize_var(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn u32_var(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

fn secs_var(key: &str, default: u64) -> Duration {
    Duration::from_secs(
        env::var(key)
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(default),
    )
}

fn minutes_var(key: &str, default: u64) -> Duration {
    Duration::from_secs(
        env::var(key)
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(default)
            * 60,
    )
}

fn hours_var(key: &str, default: u64) -> Duration {
    Duration::from_secs(
        env::var(key)
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(default)
            * 60
            * 60,
    )
}
