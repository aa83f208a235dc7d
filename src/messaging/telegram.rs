use anyhow::Context;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{InputFile, KeyboardButton, KeyboardMarkup, KeyboardRemove, MessageId};
use teloxide::RequestError;

use super::{DeliveryError, Keyboard, Messenger, ProgressHandle};
use crate::config::Config;
use crate::{ChatKey, MediaKind, Result};

/// Messenger backed by the Telegram Bot API
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

/// Build a bot client pointed at the configured Bot API server
///
/// The HTTP client timeout sits above the extended delivery budget so that
/// uploads are bounded by the per-request budget, not by the client.
pub fn build_bot(config: &Config) -> Result<Bot> {
    let token = config.bot_token()?;
    let api_url = config.api_url()?;

    let client = teloxide::net::default_reqwest_settings()
        .timeout(config.delivery_retry_timeout() + Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    Ok(Bot::with_client(token, client).set_api_url(api_url))
}

fn reply_keyboard(rows: Vec<Vec<String>>) -> KeyboardMarkup {
    let rows = rows
        .into_iter()
        .map(|row| row.into_iter().map(KeyboardButton::new).collect::<Vec<_>>());

    KeyboardMarkup::new(rows).one_time_keyboard().resize_keyboard()
}

fn is_timeout(err: &RequestError) -> bool {
    match err {
        RequestError::Network(err) => err.is_timeout(),
        _ => false,
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat: ChatKey, text: &str, keyboard: Keyboard) -> Result<()> {
        let request = self.bot.send_message(ChatId(chat.0), text);

        match keyboard {
            Keyboard::Keep => request.await,
            Keyboard::Remove => request.reply_markup(KeyboardRemove::new()).await,
            Keyboard::Options(rows) => request.reply_markup(reply_keyboard(rows)).await,
        }
        .context("Failed to send message")?;

        Ok(())
    }

    async fn send_notice(&self, chat: ChatKey, text: &str) -> Result<ProgressHandle> {
        let message = self
            .bot
            .send_message(ChatId(chat.0), text)
            .await
            .context("Failed to send progress message")?;

        Ok(ProgressHandle(message.id.0))
    }

    async fn edit_notice(&self, chat: ChatKey, notice: ProgressHandle, text: &str) -> Result<()> {
        self.bot
            .edit_message_text(ChatId(chat.0), MessageId(notice.0), text)
            .await
            .context("Failed to update progress message")?;

        Ok(())
    }

    async fn send_media(
        &self,
        chat: ChatKey,
        kind: MediaKind,
        path: &Path,
        budget: Duration,
    ) -> std::result::Result<(), DeliveryError> {
        let chat_id = ChatId(chat.0);
        let file = InputFile::file(path.to_path_buf());

        let upload = async {
            match kind {
                MediaKind::Video => self.bot.send_video(chat_id, file).await.map(|_| ()),
                MediaKind::Audio => self.bot.send_audio(chat_id, file).await.map(|_| ()),
            }
        };

        match tokio::time::timeout(budget, upload).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) if is_timeout(&err) => Err(DeliveryError::Timeout),
            Ok(Err(err)) => Err(DeliveryError::Other(
                anyhow::Error::new(err).context(format!("Failed to send {}", path.display())),
            )),
            Err(_) => Err(DeliveryError::Timeout),
        }
    }
}
