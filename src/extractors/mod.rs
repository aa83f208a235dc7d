use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;

pub mod ytdlp;

pub use ytdlp::YtDlpExtractor;

use crate::Result;

/// One progress report from a running download
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    /// Bytes written so far
    pub downloaded_bytes: u64,

    /// Total size, exact or estimated, if the source reports one
    pub total_bytes: Option<u64>,

    /// Current speed in bytes per second
    pub speed: Option<f64>,
}

/// Events streamed by an extractor while it works
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Downloading(ProgressSample),
    Finished,
}

/// Sending half of the progress channel handed to an extractor
pub type ProgressSender = UnboundedSender<ProgressEvent>;

/// Audio post-processing requested from the extractor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcode {
    /// Target codec, also the extension of the produced file
    pub codec: String,

    /// Target bitrate in kbps
    pub bitrate: String,
}

/// Everything an extractor needs to fetch one piece of media
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    /// Source URL
    pub url: String,

    /// Stream selector (yt-dlp format syntax)
    pub format: String,

    /// Optional conversion to an audio codec
    pub transcode: Option<Transcode>,

    /// Also fetch the thumbnail image next to the media
    pub write_thumbnail: bool,

    /// Directory all output lands in
    pub output_dir: PathBuf,

    /// Output naming template, relative to `output_dir`
    pub output_template: String,

    /// Netscape cookie file passed through to the extractor
    pub cookies: Option<PathBuf>,
}

/// What an extractor reports back once it is done
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescriptor {
    /// Title of the media, if known
    pub title: Option<String>,

    /// Path of the primary downloaded file, before any post-processing
    pub primary_path: PathBuf,
}

/// Trait for retrieving media from a URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Download the requested media, reporting progress on `progress`
    ///
    /// The sender is dropped when extraction ends, which closes the channel.
    async fn extract(&self, request: &ExtractRequest, progress: ProgressSender) -> Result<MediaDescriptor>;

    /// Name of the backing tool
    fn name(&self) -> &'static str;
}
