mod bot;
mod config;
mod data;
mod engine;
mod error;

use std::sync::Arc;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;

use crate::bot::commands::Operator;
use crate::data::drive::{DriveConnector, OAuthClient};
use crate::data::fetcher::{self, SimemClient};
use crate::data::upload::FastUploadClient;
use crate::engine::pipeline::Services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "energy_balance_bot=info".into()),
        )
        .init();

    let cfg = config::Config::from_env()?;
    let http = fetcher::http_client()?;

    let services = Arc::new(Services {
        store: Box::new(DriveConnector::new(
            http.clone(),
            OAuthClient {
                client_id: cfg.google_client_id.clone(),
                client_secret: cfg.google_client_secret.clone(),
            },
            cfg.credentials_path.clone(),
        )),
        market: Box::new(SimemClient::new(http.clone(), &cfg.simem_base_url)),
        uploader: Box::new(FastUploadClient::new(
            http,
            &cfg.fastupload_base_url,
            cfg.fastupload_key_1.clone(),
            cfg.fastupload_key_2.clone(),
        )),
        extraction_folder_id: cfg.extraction_folder_id.clone(),
        upload_folder_id: cfg.upload_folder_id.clone(),
        report_dir: cfg.report_dir.clone(),
    });
    let operator = Operator(ChatId(cfg.operator_chat_id));
    let bot = Bot::new(&cfg.teloxide_token);

    tracing::info!(operator = cfg.operator_chat_id, "Energy balance bot starting...");

    let handler = Update::filter_message()
        .filter_command::<bot::commands::Command>()
        .endpoint(bot::commands::handle);

    // Updates from one chat are handled in order, so an operator never has
    // two runs in flight.
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![services, operator])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
