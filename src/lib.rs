//! You2downloader - a Telegram bot for downloading YouTube videos or audio
//!
//! This library drives a per-chat conversation (URL, then format, then quality),
//! hands the collected choices to a download pipeline built on yt-dlp, and sends the
//! finished file back to the chat with progress updates along the way.

pub mod bot;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod extractors;
pub mod messaging;
pub mod pipeline;
pub mod tagging;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use conversation::{ConversationEngine, DialogState, Input};
pub use extractors::{Extractor, MediaDescriptor, ProgressEvent, ProgressSample};
pub use pipeline::{Delivered, DownloadOrchestrator, JobRequest};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Identity of a conversation (the Telegram chat id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatKey(pub i64);

impl fmt::Display for ChatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the user wants back: the full video or only its audio track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub const ALL: [MediaKind; 2] = [MediaKind::Video, MediaKind::Audio];

    /// Label shown on the format keyboard
    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Video => "🎥 Video",
            MediaKind::Audio => "🎵 Audio",
        }
    }

    /// Exact match against the keyboard labels
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }

    /// Lowercase noun used in user-facing messages
    pub fn noun(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.noun())
    }
}

/// Ways a download job can fail
///
/// Every variant is handled inside the pipeline: the user has been told and
/// the job's files are gone by the time one of these reaches a caller.
#[derive(thiserror::Error, Debug)]
pub enum JobError {
    #[error("Media extraction failed: {0:#}")]
    Extraction(anyhow::Error),

    #[error("Expected output file was not produced: {}", .0.display())]
    ExtractionIncomplete(PathBuf),

    #[error("Delivery timed out, also with the extended budget")]
    DeliveryTimeout,

    #[error("Delivery failed: {0:#}")]
    Delivery(anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
