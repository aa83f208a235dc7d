use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

pub mod telegram;

pub use telegram::TelegramMessenger;

use crate::{ChatKey, MediaKind, Result};

/// Reply keyboard attached to an outgoing text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    /// Leave whatever keyboard the user currently has
    Keep,
    /// Hide the custom keyboard
    Remove,
    /// One-time keyboard with these rows of options
    Options(Vec<Vec<String>>),
}

impl Keyboard {
    /// All labels on a single row
    pub fn single_row<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Keyboard::Options(vec![labels.into_iter().map(Into::into).collect()])
    }

    /// Labels laid out two per row
    pub fn pairs<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        Keyboard::Options(labels.chunks(2).map(<[String]>::to_vec).collect())
    }
}

/// Handle to a sent message that can later be edited in place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressHandle(pub i32);

/// Why sending a media file failed
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("Upload did not finish within its time budget")]
    Timeout,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Outbound side of the chat transport
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a plain text message
    async fn send_text(&self, chat: ChatKey, text: &str, keyboard: Keyboard) -> Result<()>;

    /// Send a message meant to be edited as progress is made
    async fn send_notice(&self, chat: ChatKey, text: &str) -> Result<ProgressHandle>;

    /// Replace the text of a notice sent with [`Messenger::send_notice`]
    async fn edit_notice(&self, chat: ChatKey, notice: ProgressHandle, text: &str) -> Result<()>;

    /// Upload a finished file, giving up after `budget`
    async fn send_media(
        &self,
        chat: ChatKey,
        kind: MediaKind,
        path: &Path,
        budget: Duration,
    ) -> std::result::Result<(), DeliveryError>;
}
