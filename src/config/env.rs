use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    /// Channel username (`@channel`) or numeric chat id.
    pub channel_id: String,
    pub admin_group_id: Option<i64>,
    pub feeds: Vec<FeedConfig>,
    pub scanner: ScannerConfig,
    pub delivery: DeliveryConfig,
    pub dedup: DedupConfig,
    pub render: RenderConfig,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
    pub timezone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub interval: Duration,
    pub max_per_cycle: usize,
    /// Entries older than this are skipped outright.
    pub max_entry_age: Duration,
    pub fetch_timeout: Duration,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub queue_capacity: usize,
    /// Transient send failures allowed before an item is dropped.
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Pause after every successful send, as flood prevention.
    pub min_send_gap: Duration,
}

#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Trailing window for the near-duplicate title check.
    pub title_window: Duration,
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub brand: String,
    /// Candidate font files, first readable one wins.
    pub font_paths: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
    pub data_dir: String,
    pub db_filename: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
