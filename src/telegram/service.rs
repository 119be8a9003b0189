use std::{sync::Arc, time::Duration};

use anyhow::Result;
use teloxide::{
    dispatching::Dispatcher, prelude::*, types::Message, utils::command::BotCommands,
};
use tokio::time::Instant;

use crate::{config::AppConfig, infrastructure::shutdown::ShutdownListener};

use super::types::{AppState, BotResult, GeneralCommand, StatsProvider};

/// Command surface of the bot: `/start`, `/stats`, `/ping`. The delivery
/// pipeline itself runs in the background tasks; this dispatcher only serves
/// status queries.
pub struct TelegramService {
    bot: Bot,
    state: Arc<AppState>,
}

impl TelegramService {
    pub fn new(bot: Bot, config: Arc<AppConfig>, stats: StatsProvider) -> Self {
        let state = Arc::new(AppState { config, stats });
        Self { bot, state }
    }

    pub async fn run(&self, mut shutdown: ShutdownListener) -> Result<()> {
        self.bot.set_my_commands(GeneralCommand::bot_commands()).await?;
        let me = self.bot.get_me().await?;
        tracing::info!(
            target: "telegram",
            bot_id = me.id.0,
            username = ?me.username,
            "telegram bot connected"
        );

        let handler = Update::filter_message().branch(
            dptree::entry()
                .filter_command::<GeneralCommand>()
                .endpoint(Self::on_command),
        );

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![self.state.clone()])
            .default_handler(|update| async move {
                tracing::debug!(target: "telegram", ?update, "unhandled update");
            })
            .build();

        let shutdown_token = dispatcher.shutdown_token();
        let mut dispatcher_future = Box::pin(dispatcher.dispatch());
        let mut dispatcher_finished = false;

        tokio::select! {
            _ = shutdown.notified() => {
                tracing::info!(target: "telegram", "dispatcher shutdown requested");
                if let Ok(wait) = shutdown_token.shutdown() {
                    wait.await;
                }
            }
            _ = &mut dispatcher_future => {
                dispatcher_finished = true;
                tracing::info!(target: "telegram", "dispatcher finished");
            }
        }

        if !dispatcher_finished {
            dispatcher_future.await;
        }

        Ok(())
    }

    async fn on_command(
        bot: Bot,
        msg: Message,
        cmd: GeneralCommand,
        state: Arc<AppState>,
    ) -> BotResult<()> {
        match cmd {
            GeneralCommand::Start => {
                let text = start_message(
                    state.config.feeds.len(),
                    state.config.scanner.interval,
                );
                bot.send_message(msg.chat.id, text).await?
            }
            GeneralCommand::Stats => {
                let snapshot = (state.stats)();
                bot.send_message(
                    msg.chat.id,
                    format!(
                        "Pipeline stats\n\
                         - Queue depth: {}\n\
                         - Total sent: {}\n\
                         - Total failed: {}\n\
                         - Uptime: {}",
                        snapshot.queue_depth,
                        snapshot.total_sent,
                        snapshot.total_failed,
                        format_uptime(snapshot.uptime),
                    ),
                )
                .await?
            }
            GeneralCommand::Ping => {
                let start = Instant::now();
                let sent = bot.send_message(msg.chat.id, "Measuring...").await?;
                let elapsed = start.elapsed();
                bot.edit_message_text(
                    msg.chat.id,
                    sent.id,
                    format!("Pong! {:.3}s", elapsed.as_secs_f64()),
                )
                .await?
            }
        };
        Ok(())
    }
}

fn start_message(feed_count: usize, interval: Duration) -> String {
    format!(
        "News card bot is running.\n\
         Tracking {} feed(s), scanning every {} minutes.\n\
         Use /stats for pipeline statistics.",
        feed_count,
        interval.as_secs() / 60,
    )
}

fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m {}s", secs % 60)
    }
}
