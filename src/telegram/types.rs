use std::sync::Arc;

use teloxide::utils::command::BotCommands;

use crate::{config::AppConfig, domain::StatsSnapshot};

pub type StatsProvider = Arc<dyn Fn() -> StatsSnapshot + Send + Sync>;
pub type BotResult<T> = Result<T, teloxide::RequestError>;

pub struct AppState {
    pub config: Arc<AppConfig>,
    pub stats: StatsProvider,
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "snake_case", description = "Available commands:")]
pub enum GeneralCommand {
    #[command(description = "bot introduction")]
    Start,
    #[command(description = "delivery pipeline statistics")]
    Stats,
    #[command(description = "measure response latency")]
    Ping,
}
