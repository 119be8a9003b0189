use std::{future::Future, time::Duration};

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, Recipient},
    RequestError,
};
use thiserror::Error;
use url::Url;

/// Failure taxonomy the delivery worker keys its retry policy on.
#[derive(Debug, Error)]
pub enum SendError {
    /// Platform flood control. `retry_after` carries the platform-suggested
    /// wait when one was provided.
    #[error("rate limited by the messaging platform")]
    RateLimited { retry_after: Option<Duration> },
    #[error("transient send failure: {0}")]
    Transient(String),
    #[error("permanent send failure: {0}")]
    Permanent(String),
}

/// Messaging client consumed by the delivery worker.
pub trait CardSender: Send + Sync + 'static {
    fn send(
        &self,
        caption: &str,
        link: &str,
        png: &[u8],
    ) -> impl Future<Output = Result<(), SendError>> + Send;
}

pub struct TelegramSender {
    bot: Bot,
    channel: Recipient,
}

impl TelegramSender {
    pub fn new(bot: Bot, channel: Recipient) -> Self {
        Self { bot, channel }
    }

    fn classify(err: RequestError) -> SendError {
        match err {
            RequestError::RetryAfter(seconds) => SendError::RateLimited {
                retry_after: Some(seconds.duration()),
            },
            RequestError::Network(_) | RequestError::Io(_) => {
                SendError::Transient(err.to_string())
            }
            RequestError::InvalidJson { .. } => SendError::Transient(err.to_string()),
            other => SendError::Permanent(other.to_string()),
        }
    }
}

impl CardSender for TelegramSender {
    async fn send(&self, caption: &str, link: &str, png: &[u8]) -> Result<(), SendError> {
        let photo = InputFile::memory(png.to_vec()).file_name("card.png");
        let mut request = self
            .bot
            .send_photo(self.channel.clone(), photo)
            .caption(caption.to_string());

        if let Ok(url) = Url::parse(link) {
            let button = InlineKeyboardButton::url("Read Full Article", url);
            request = request.reply_markup(InlineKeyboardMarkup::new([[button]]));
        }

        request.await.map(|_| ()).map_err(Self::classify)
    }
}
