use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::bot::messages;
use crate::bot::notifier::TelegramSink;
use crate::engine::pipeline::{self, Services};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Chat allowed to trigger runs.
#[derive(Clone, Copy)]
pub struct Operator(pub ChatId);

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Comandos disponibles:")]
pub enum Command {
    #[command(description = "presentación")]
    Start,
    #[command(description = "calcular el balance de energía")]
    Balance,
    #[command(description = "enviar y guardar el informe del día")]
    Enviar,
    #[command(description = "ver esta ayuda")]
    Ayuda,
}

pub async fn handle(
    bot: Bot,
    msg: Message,
    cmd: Command,
    services: Arc<Services>,
    operator: Operator,
) -> HandlerResult {
    if msg.chat.id != operator.0 {
        tracing::warn!(chat_id = msg.chat.id.0, "Command from unauthorized chat");
        bot.send_message(msg.chat.id, messages::NOT_AUTHORIZED).await?;
        return Ok(());
    }

    match cmd {
        Command::Start => {
            bot.send_message(msg.chat.id, messages::welcome_message()).await?;
        }
        Command::Ayuda => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string()).await?;
        }
        Command::Balance => {
            // Outcome is narrated through the sink and logged by the pipeline.
            let sink = TelegramSink::new(bot.clone(), msg.chat.id);
            pipeline::run_etl(&services, &sink).await.ok();
        }
        Command::Enviar => {
            let sink = TelegramSink::new(bot.clone(), msg.chat.id);
            pipeline::send_report(&services, &sink).await.ok();
        }
    }
    Ok(())
}
