mod config;
mod llm;
mod platform;
mod relay;

use std::path::PathBuf;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{redact, Config};
use crate::llm::LlmClient;
use crate::platform::telegram::{self, TelegramSink};
use crate::relay::Relay;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gptrelay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = dotenvy::dotenv() {
        debug!("No .env file loaded: {}", e);
    }

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;

    info!(
        "Credentials loaded. Telegram: {}, OpenAI: {}",
        redact(&config.credentials.telegram_token),
        redact(&config.credentials.openai_key)
    );

    let bot = telegram::build_bot(
        &config.credentials.telegram_token,
        &config.settings.telegram,
    )?;
    let me = bot
        .get_me()
        .await
        .context("Failed to initialize Telegram bot")?;
    info!("Bot @{} started", me.username());

    let llm = LlmClient::new(
        config.settings.llm.clone(),
        config.credentials.openai_key.clone(),
    );
    info!("  Model: {}", llm.model());

    let sink = TelegramSink::new(bot.clone());
    let relay = Relay::new(&llm, &sink, config.settings.relay.clone());

    relay
        .run(telegram::updates(bot, &config.settings.telegram))
        .await;

    Ok(())
}
