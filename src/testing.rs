//! In-memory messenger used by unit tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::messaging::{DeliveryError, Keyboard, Messenger, ProgressHandle};
use crate::{ChatKey, MediaKind, Result};

#[derive(Debug, Clone)]
pub struct SentText {
    pub chat: ChatKey,
    pub text: String,
    pub keyboard: Keyboard,
}

#[derive(Debug, Clone)]
pub struct SentMedia {
    pub kind: MediaKind,
    pub path: PathBuf,
    pub budget: Duration,
    /// Whether the file was on disk at upload time
    pub existed: bool,
}

/// Records everything sent; media deliveries follow a script, defaulting to success
#[derive(Default)]
pub struct RecordingMessenger {
    texts: Mutex<Vec<SentText>>,
    notices: Mutex<Vec<String>>,
    edits: Mutex<Vec<String>>,
    media: Mutex<Vec<SentMedia>>,
    delivery_script: Mutex<VecDeque<std::result::Result<(), DeliveryError>>>,
}

impl RecordingMessenger {
    pub fn script_delivery<I>(&self, outcomes: I)
    where
        I: IntoIterator<Item = std::result::Result<(), DeliveryError>>,
    {
        self.delivery_script.lock().unwrap().extend(outcomes);
    }

    pub fn texts(&self) -> Vec<SentText> {
        self.texts.lock().unwrap().clone()
    }

    pub fn last_text(&self) -> Option<String> {
        self.texts.lock().unwrap().last().map(|sent| sent.text.clone())
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<String> {
        self.edits.lock().unwrap().clone()
    }

    pub fn media(&self) -> Vec<SentMedia> {
        self.media.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, chat: ChatKey, text: &str, keyboard: Keyboard) -> Result<()> {
        self.texts.lock().unwrap().push(SentText {
            chat,
            text: text.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn send_notice(&self, _chat: ChatKey, text: &str) -> Result<ProgressHandle> {
        let mut notices = self.notices.lock().unwrap();
        notices.push(text.to_string());
        Ok(ProgressHandle(notices.len() as i32))
    }

    async fn edit_notice(&self, _chat: ChatKey, _notice: ProgressHandle, text: &str) -> Result<()> {
        self.edits.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn send_media(
        &self,
        _chat: ChatKey,
        kind: MediaKind,
        path: &Path,
        budget: Duration,
    ) -> std::result::Result<(), DeliveryError> {
        self.media.lock().unwrap().push(SentMedia {
            kind,
            path: path.to_path_buf(),
            budget,
            existed: path.exists(),
        });
        self.delivery_script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}
