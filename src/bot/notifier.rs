use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::InputFile;

use crate::bot::messages;
use crate::engine::progress::{ProgressSink, Status};
use crate::engine::report::Report;

/// Pushes run progress into the operator's chat.
pub struct TelegramSink {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramSink {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }

    async fn send_text(&self, text: &str) {
        if let Err(e) = self.bot.send_message(self.chat_id, text).await {
            tracing::error!(chat_id = self.chat_id.0, error = %e, "Failed to send progress message");
        }
    }
}

#[async_trait]
impl ProgressSink for TelegramSink {
    async fn status(&self, status: Status, text: &str) {
        let icon = match status {
            Status::Ok => "\u{2705}",
            Status::Error => "\u{274c}",
        };
        self.send_text(&format!("{icon} {text}")).await;
    }

    async fn report(&self, report: &Report) {
        self.send_text(&messages::format_balance(report)).await;

        let json = match report.to_json() {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Could not serialize report for delivery");
                return;
            }
        };
        let file = InputFile::memory(json.into_bytes()).file_name("balance_energia.json");
        if let Err(e) = self.bot.send_document(self.chat_id, file).await {
            tracing::error!(chat_id = self.chat_id.0, error = %e, "Failed to send report document");
        }
    }

    async fn stop(&self) {
        self.send_text(messages::STOPPED).await;
    }
}
