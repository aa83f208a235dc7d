use anyhow::Context;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::Me;
use teloxide::utils::command::BotCommands;

use crate::config::Config;
use crate::conversation::{ConversationEngine, Input};
use crate::extractors::YtDlpExtractor;
use crate::messaging::telegram::{build_bot, TelegramMessenger};
use crate::pipeline::{DownloadOrchestrator, PipelineSettings, ProgressThrottle};
use crate::tagging::Id3Tagger;
use crate::{ChatKey, Result};

/// Commands registered with Telegram
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Comandos disponibles:")]
pub enum Command {
    #[command(description = "empezar a descargar videos o audio")]
    Start,
    #[command(description = "cancelar la operación actual")]
    Cancel,
}

/// Classify an incoming text; `None` for commands this bot does not know
pub fn classify(text: &str, bot_username: &str) -> Option<Input> {
    match Command::parse(text, bot_username) {
        Ok(Command::Start) => Some(Input::Start),
        Ok(Command::Cancel) => Some(Input::Cancel),
        Err(_) if text.starts_with('/') => None,
        Err(_) => Some(Input::Text(text.to_string())),
    }
}

/// Assemble the engine with its production collaborators
pub fn build_engine(config: &Config, messenger: Arc<TelegramMessenger>) -> ConversationEngine {
    let throttle = Arc::new(ProgressThrottle::new(config.progress_interval()));
    let extractor = Arc::new(YtDlpExtractor::with_binary(&config.downloads.yt_dlp_path));

    let orchestrator = DownloadOrchestrator::new(
        extractor,
        Arc::new(Id3Tagger),
        messenger.clone(),
        throttle,
        PipelineSettings::from_config(config),
    );

    ConversationEngine::new(Arc::new(orchestrator), messenger)
}

/// Start long polling and serve until interrupted
pub async fn run(config: Config) -> Result<()> {
    let bot = build_bot(&config)?;
    let messenger = Arc::new(TelegramMessenger::new(bot.clone()));
    let engine = Arc::new(build_engine(&config, messenger));

    let me = bot.get_me().await.context("Failed to reach the Bot API")?;
    tracing::info!("Connected as @{}", me.username());

    if let Err(err) = bot.set_my_commands(Command::bot_commands()).await {
        tracing::warn!("Could not register bot commands: {}", err);
    }

    // Do not replay messages that piled up while the bot was down
    bot.delete_webhook()
        .drop_pending_updates(true)
        .await
        .context("Failed to drop pending updates")?;

    let sweeper = tokio::spawn(sweep_idle_sessions(
        engine.clone(),
        config.sweep_interval(),
        config.session_ttl(),
    ));

    tracing::info!("Bot started. Waiting for commands...");

    let handler = Update::filter_message().endpoint(on_message);
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![engine])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    sweeper.abort();
    tracing::info!("Bot stopped");
    Ok(())
}

async fn on_message(msg: Message, me: Me, engine: Arc<ConversationEngine>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let chat = ChatKey(msg.chat.id.0);
    match classify(text, me.username()) {
        Some(input) => {
            let state = engine.handle(chat, input).await;
            tracing::debug!(chat = %chat, "Now in state {:?}", state);
        }
        None => tracing::debug!(chat = %chat, "Ignoring unknown command: {}", text),
    }

    Ok(())
}

async fn sweep_idle_sessions(
    engine: Arc<ConversationEngine>,
    every: std::time::Duration,
    ttl: std::time::Duration,
) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let evicted = engine.evict_idle(ttl);
        if evicted > 0 {
            tracing::info!(
                "Evicted {} idle conversation(s), {} still open",
                evicted,
                engine.active_sessions()
            );
        }
    }
}
