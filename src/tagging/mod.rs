use async_trait::async_trait;
use id3::frame::{Picture, PictureType};
use id3::{Tag, TagLike, Version};
use std::path::{Path, PathBuf};

/// Why a cover could not be embedded
#[derive(thiserror::Error, Debug)]
pub enum TaggingError {
    #[error("Audio file does not exist: {}", .0.display())]
    MissingAudio(PathBuf),

    #[error("Cover image does not exist: {}", .0.display())]
    MissingImage(PathBuf),

    #[error("Failed to write ID3 tag: {0}")]
    Tag(#[from] id3::Error),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tagging task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Embeds cover art into finished audio files
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Tagger: Send + Sync {
    /// Attach `image` as the front cover of `audio`, in place
    ///
    /// On success the image file has been consumed (removed).
    async fn embed_cover(&self, audio: &Path, image: &Path) -> Result<(), TaggingError>;
}

/// Writes an ID3 APIC frame into MP3 files
#[derive(Debug, Default, Clone, Copy)]
pub struct Id3Tagger;

#[async_trait]
impl Tagger for Id3Tagger {
    async fn embed_cover(&self, audio: &Path, image: &Path) -> Result<(), TaggingError> {
        if !audio.exists() {
            return Err(TaggingError::MissingAudio(audio.to_path_buf()));
        }
        if !image.exists() {
            return Err(TaggingError::MissingImage(image.to_path_buf()));
        }

        let audio = audio.to_path_buf();
        let image = image.to_path_buf();

        tokio::task::spawn_blocking(move || write_cover(&audio, &image)).await?
    }
}

fn write_cover(audio: &Path, image: &Path) -> Result<(), TaggingError> {
    let data = fs_err::read(image)?;

    let mut tag = match Tag::read_from_path(audio) {
        Ok(tag) => tag,
        Err(err) if matches!(err.kind, id3::ErrorKind::NoTag) => Tag::new(),
        Err(err) => return Err(err.into()),
    };

    tag.add_frame(Picture {
        mime_type: image_mime_type(image).to_string(),
        picture_type: PictureType::CoverFront,
        description: "Cover".to_string(),
        data,
    });

    tag.write_to_path(audio, Version::Id3v23)?;
    fs_err::remove_file(image)?;

    tracing::debug!("Embedded cover {} into {}", image.display(), audio.display());
    Ok(())
}

fn image_mime_type(image: &Path) -> &'static str {
    match image
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "image/webp",
    }
}
