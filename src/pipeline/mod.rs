use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::extractors::{ExtractRequest, Extractor, ProgressEvent, Transcode};
use crate::messaging::{DeliveryError, Keyboard, Messenger, ProgressHandle};
use crate::tagging::Tagger;
use crate::{ChatKey, JobError, MediaKind};

pub mod cleanup;
pub mod progress;

pub use cleanup::{release, CleanupReport};
pub use progress::{render_progress, ProgressThrottle};

/// Codec audio downloads are transcoded to
pub const AUDIO_CODEC: &str = "mp3";

/// Extension thumbnails are converted to
pub const THUMBNAIL_EXTENSION: &str = "webp";

const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// A completed set of choices from the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub chat: ChatKey,
    pub url: String,
    pub kind: MediaKind,

    /// Quality selector: a height for video, a bitrate for audio
    pub quality: String,

    /// Notice to edit with progress, if one could be sent
    pub progress: Option<ProgressHandle>,
}

/// How a successful job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivered {
    /// Delivered on the first attempt, with cover art for audio
    Complete,
    /// Audio delivered, but the cover could not be embedded
    WithoutCover,
    /// Delivered by the retry after a timed-out first attempt
    SecondAttempt,
}

/// Something that can carry out a download request
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run one job to completion
    ///
    /// Errors have already been reported to the user and cleaned up after.
    async fn run(&self, request: JobRequest) -> Result<Delivered, JobError>;
}

/// Settings the orchestrator needs from the configuration
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub work_dir: PathBuf,
    pub cookies: PathBuf,
    pub delivery_timeout: Duration,
    pub delivery_retry_timeout: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            work_dir: config.downloads.work_dir.clone(),
            cookies: config.downloads.cookies_path.clone(),
            delivery_timeout: config.delivery_timeout(),
            delivery_retry_timeout: config.delivery_retry_timeout(),
        }
    }
}

/// One fetch-transcode-deliver-cleanup cycle
///
/// Owns a private working directory and every path created inside it; all of
/// them are gone once the job is finished.
#[derive(Debug)]
pub struct DownloadJob {
    pub id: Uuid,
    pub chat: ChatKey,
    pub url: String,
    pub kind: MediaKind,
    pub quality: String,
    pub progress: Option<ProgressHandle>,
    dir: TempDir,
    primary: Option<PathBuf>,
    audio: Option<PathBuf>,
    thumbnail: Option<PathBuf>,
}

impl DownloadJob {
    fn prepare(request: JobRequest, work_dir: &Path) -> anyhow::Result<Self> {
        fs_err::create_dir_all(work_dir)?;

        let id = Uuid::new_v4();
        let dir = tempfile::Builder::new()
            .prefix(&format!("job-{}-", &id.to_string()[..8]))
            .tempdir_in(work_dir)
            .context("Failed to create job directory")?;

        Ok(Self {
            id,
            chat: request.chat,
            url: request.url,
            kind: request.kind,
            quality: request.quality,
            progress: request.progress,
            dir,
            primary: None,
            audio: None,
            thumbnail: None,
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Every file path this job has created or expects to create
    pub fn local_paths(&self) -> [Option<PathBuf>; 3] {
        [self.primary.clone(), self.audio.clone(), self.thumbnail.clone()]
    }

    /// Stream selector and post-processing for this job's choices
    pub fn extract_request(&self, cookies: Option<PathBuf>) -> ExtractRequest {
        let (format, transcode, write_thumbnail) = match self.kind {
            MediaKind::Video => (video_format(&self.quality), None, false),
            MediaKind::Audio => (
                "bestaudio/best".to_string(),
                Some(Transcode {
                    codec: AUDIO_CODEC.to_string(),
                    bitrate: self.quality.clone(),
                }),
                true,
            ),
        };

        ExtractRequest {
            url: self.url.clone(),
            format,
            transcode,
            write_thumbnail,
            output_dir: self.dir().to_path_buf(),
            output_template: OUTPUT_TEMPLATE.to_string(),
            cookies,
        }
    }
}

/// Best single stream, bounded by height when the selector is a number
fn video_format(quality: &str) -> String {
    match quality.trim().parse::<u32>() {
        Ok(height) => format!("best[height<={}]/best", height),
        Err(_) => "best".to_string(),
    }
}

/// Drives download jobs from extraction to delivery
pub struct DownloadOrchestrator {
    extractor: Arc<dyn Extractor>,
    tagger: Arc<dyn Tagger>,
    messenger: Arc<dyn Messenger>,
    throttle: Arc<ProgressThrottle>,
    settings: PipelineSettings,
}

impl DownloadOrchestrator {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        tagger: Arc<dyn Tagger>,
        messenger: Arc<dyn Messenger>,
        throttle: Arc<ProgressThrottle>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            extractor,
            tagger,
            messenger,
            throttle,
            settings,
        }
    }

    async fn execute(&self, job: &mut DownloadJob) -> Result<Delivered, JobError> {
        let cookies = Some(self.settings.cookies.clone()).filter(|path| path.exists());
        let request = job.extract_request(cookies);

        tracing::info!("Downloading {} with {} ({})", job.url, self.extractor.name(), request.format);

        let (tx, rx) = mpsc::unbounded_channel();
        let (extracted, ()) = tokio::join!(
            self.extractor.extract(&request, tx),
            self.forward_progress(job.chat, job.progress, rx),
        );
        let media = extracted.map_err(JobError::Extraction)?;

        tracing::info!(
            "Extracted {:?} to {}",
            media.title.as_deref().unwrap_or("untitled"),
            media.primary_path.display()
        );

        let primary = media.primary_path;
        job.primary = Some(primary.clone());

        let artifact = match job.kind {
            MediaKind::Video => primary,
            MediaKind::Audio => {
                let audio = primary.with_extension(AUDIO_CODEC);
                job.thumbnail = Some(audio.with_extension(THUMBNAIL_EXTENSION));
                job.audio = Some(audio.clone());
                audio
            }
        };

        if !artifact.exists() {
            return Err(JobError::ExtractionIncomplete(artifact));
        }

        let mut tagged = true;
        if let (MediaKind::Audio, Some(thumbnail)) = (job.kind, job.thumbnail.as_deref()) {
            if let Err(err) = self.tagger.embed_cover(&artifact, thumbnail).await {
                tracing::warn!("Could not embed cover art: {}", err);
                tagged = false;
            }
        }

        let retried = self.deliver(job.chat, job.kind, &artifact).await?;

        Ok(match (retried, tagged) {
            (true, _) => Delivered::SecondAttempt,
            (false, false) => Delivered::WithoutCover,
            (false, true) => Delivered::Complete,
        })
    }

    /// Relay extractor progress into edits of the chat's progress notice
    async fn forward_progress(
        &self,
        chat: ChatKey,
        notice: Option<ProgressHandle>,
        mut events: UnboundedReceiver<ProgressEvent>,
    ) {
        while let Some(event) = events.recv().await {
            let text = match event {
                ProgressEvent::Downloading(sample) => {
                    if !self.throttle.should_emit(chat) {
                        continue;
                    }
                    render_progress(&sample)
                }
                ProgressEvent::Finished => {
                    self.throttle.clear(chat);
                    "¡Descarga completada! Procesando archivo...".to_string()
                }
            };

            if let Some(notice) = notice {
                if let Err(err) = self.messenger.edit_notice(chat, notice, &text).await {
                    tracing::warn!("Error updating progress: {:#}", err);
                }
            }
        }
    }

    /// Send the artifact; returns whether the extended retry was needed
    async fn deliver(&self, chat: ChatKey, kind: MediaKind, path: &Path) -> Result<bool, JobError> {
        let first = self
            .messenger
            .send_media(chat, kind, path, self.settings.delivery_timeout)
            .await;

        match first {
            Ok(()) => Ok(false),
            Err(DeliveryError::Other(err)) => Err(JobError::Delivery(err)),
            Err(DeliveryError::Timeout) => {
                tracing::warn!(
                    "Delivery timed out after {:?}, retrying with {:?}",
                    self.settings.delivery_timeout,
                    self.settings.delivery_retry_timeout
                );

                match self
                    .messenger
                    .send_media(chat, kind, path, self.settings.delivery_retry_timeout)
                    .await
                {
                    Ok(()) => Ok(true),
                    Err(DeliveryError::Timeout) => Err(JobError::DeliveryTimeout),
                    Err(DeliveryError::Other(err)) => Err(JobError::Delivery(err)),
                }
            }
        }
    }

    fn finish(&self, job: DownloadJob) {
        self.throttle.clear(job.chat);

        let report = release(&job.local_paths());
        if !report.is_clean() {
            tracing::warn!("{} job file(s) could not be removed", report.failures.len());
        }

        let dir = job.dir().to_path_buf();
        if let Err(err) = job.dir.close() {
            tracing::warn!("Failed to remove job directory {}: {}", dir.display(), err);
        }
    }

    async fn report(&self, chat: ChatKey, kind: MediaKind, outcome: &Result<Delivered, JobError>) {
        let text = match outcome {
            Ok(Delivered::Complete) => match kind {
                MediaKind::Video => "¡Video descargado y enviado con éxito!".to_string(),
                MediaKind::Audio => "¡Audio descargado y enviado con éxito!".to_string(),
            },
            Ok(Delivered::WithoutCover) => "¡Audio enviado! (sin carátula)".to_string(),
            Ok(Delivered::SecondAttempt) => match kind {
                MediaKind::Video => "¡Video enviado en el segundo intento!".to_string(),
                MediaKind::Audio => "¡Audio enviado en el segundo intento!".to_string(),
            },
            Err(JobError::Extraction(_)) | Err(JobError::ExtractionIncomplete(_)) => format!(
                "Hubo un error al descargar el {}. Por favor, asegúrate de que el enlace es válido.",
                kind.noun()
            ),
            Err(JobError::DeliveryTimeout) => {
                "El archivo se descargó pero hubo un error al enviarlo. Por favor, intenta de nuevo.".to_string()
            }
            Err(JobError::Delivery(_)) | Err(JobError::Other(_)) => {
                "Ocurrió un error inesperado al procesar tu solicitud. Por favor, intenta de nuevo.".to_string()
            }
        };

        if let Err(err) = self.messenger.send_text(chat, &text, Keyboard::Keep).await {
            tracing::warn!("Failed to report job outcome: {:#}", err);
        }
    }
}

#[async_trait]
impl JobRunner for DownloadOrchestrator {
    async fn run(&self, request: JobRequest) -> Result<Delivered, JobError> {
        let (chat, kind) = (request.chat, request.kind);

        let mut job = match DownloadJob::prepare(request, &self.settings.work_dir) {
            Ok(job) => job,
            Err(err) => {
                tracing::error!("Could not prepare download job: {:#}", err);
                let outcome = Err(JobError::Other(err));
                self.report(chat, kind, &outcome).await;
                return outcome;
            }
        };

        let span = tracing::info_span!("job", id = %job.id, chat = %chat, kind = %kind);

        async move {
            let outcome = self.execute(&mut job).await;
            self.finish(job);

            match &outcome {
                Ok(delivered) => tracing::info!("Job finished: {:?}", delivered),
                Err(err) => tracing::error!("Job failed: {}", err),
            }

            self.report(chat, kind, &outcome).await;
            outcome
        }
        .instrument(span)
        .await
    }
}
