pub mod sender;
pub mod service;
pub mod types;

pub use sender::{CardSender, SendError, TelegramSender};
pub use service::TelegramService;
pub use types::StatsProvider;
