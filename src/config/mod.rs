pub mod env;
mod loader;

pub use env::{
    AppConfig, ConfigError, DedupConfig, DeliveryConfig, DirectoryConfig, FeedConfig,
    LoggingConfig, RenderConfig, ScannerConfig,
};
pub use loader::load_config;
