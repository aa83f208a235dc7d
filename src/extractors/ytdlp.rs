use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use super::{ExtractRequest, Extractor, MediaDescriptor, ProgressEvent, ProgressSample, ProgressSender};
use crate::Result;

const PROGRESS_PREFIX: &str = "[progress]";
const TITLE_PREFIX: &str = "[title]";
const FILE_PREFIX: &str = "[file]";

/// Fields are `|`-separated; yt-dlp renders missing ones as `NA`
const PROGRESS_TEMPLATE: &str = "download:[progress]%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s";

/// Media extractor backed by the yt-dlp executable
pub struct YtDlpExtractor {
    yt_dlp_path: String,
}

impl YtDlpExtractor {
    pub fn new() -> Self {
        Self::with_binary("yt-dlp")
    }

    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            yt_dlp_path: path.into(),
        }
    }

    /// Check if yt-dlp is available
    pub async fn check_availability(&self) -> bool {
        Command::new(&self.yt_dlp_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Build the yt-dlp command line for a request
    pub fn build_args(request: &ExtractRequest) -> Vec<String> {
        let output = request.output_dir.join(&request.output_template);

        let mut args: Vec<String> = [
            "--newline",
            "--no-playlist",
            // --print implies --simulate and --quiet; undo the first, keep progress despite the second
            "--no-simulate",
            "--progress",
            "--progress-template",
            PROGRESS_TEMPLATE,
            "--print",
            "before_dl:[title]%(title)s",
            "--print",
            "before_dl:[file]%(_filename)s",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        args.push("--format".into());
        args.push(request.format.clone());
        args.push("--output".into());
        args.push(output.to_string_lossy().into_owned());

        if let Some(cookies) = &request.cookies {
            args.push("--cookies".into());
            args.push(cookies.to_string_lossy().into_owned());
        }

        if let Some(transcode) = &request.transcode {
            args.extend([
                "--extract-audio".to_string(),
                "--audio-format".to_string(),
                transcode.codec.clone(),
                "--audio-quality".to_string(),
                format!("{}K", transcode.bitrate),
                // The original download stays on disk until the job cleans it up
                "--keep-video".to_string(),
            ]);
        }

        if request.write_thumbnail {
            args.extend([
                "--write-thumbnail".to_string(),
                "--convert-thumbnails".to_string(),
                "webp".to_string(),
            ]);
        }

        args.push(request.url.clone());
        args
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn extract(&self, request: &ExtractRequest, progress: ProgressSender) -> Result<MediaDescriptor> {
        let args = Self::build_args(request);
        tracing::debug!("Running {} {:?}", self.yt_dlp_path, args);

        let mut child = Command::new(&self.yt_dlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.yt_dlp_path))?;

        let stdout = child.stdout.take().context("yt-dlp stdout was not captured")?;
        let mut stderr = child.stderr.take().context("yt-dlp stderr was not captured")?;

        let stderr_task = tokio::spawn(async move {
            let mut buffer = String::new();
            let _ = stderr.read_to_string(&mut buffer).await;
            buffer
        });

        let mut title = None;
        let mut primary_path = None;
        let mut lines = BufReader::new(stdout).lines();

        while let Some(line) = lines.next_line().await? {
            match parse_line(&line) {
                Some(OutputLine::Progress(event)) => {
                    // A closed receiver only means nobody is watching any more
                    let _ = progress.send(event);
                }
                Some(OutputLine::Title(value)) => title = Some(value),
                Some(OutputLine::File(path)) => primary_path = Some(path),
                None => tracing::trace!("yt-dlp: {}", line),
            }
        }

        let status = child.wait().await?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if !status.success() {
            anyhow::bail!("yt-dlp failed ({}): {}", status, stderr_output.trim());
        }

        let primary_path = primary_path.context("yt-dlp did not report an output filename")?;

        Ok(MediaDescriptor { title, primary_path })
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// A line of yt-dlp output we care about
#[derive(Debug, PartialEq)]
enum OutputLine {
    Progress(ProgressEvent),
    Title(String),
    File(PathBuf),
}

fn parse_line(line: &str) -> Option<OutputLine> {
    let line = line.trim_end();

    if let Some(rest) = line.strip_prefix(PROGRESS_PREFIX) {
        return parse_progress(rest).map(OutputLine::Progress);
    }
    if let Some(rest) = line.strip_prefix(TITLE_PREFIX) {
        return Some(OutputLine::Title(rest.to_string()));
    }
    if let Some(rest) = line.strip_prefix(FILE_PREFIX) {
        return (!rest.is_empty()).then(|| OutputLine::File(PathBuf::from(rest)));
    }

    None
}

fn parse_progress(fields: &str) -> Option<ProgressEvent> {
    let mut parts = fields.split('|');
    let status = parts.next()?;

    match status {
        "finished" => Some(ProgressEvent::Finished),
        "downloading" => {
            let downloaded = parse_number(parts.next()?)?;
            let total = parts.next().and_then(parse_number);
            let estimate = parts.next().and_then(parse_number);
            let speed = parts.next().and_then(parse_number);

            Some(ProgressEvent::Downloading(ProgressSample {
                downloaded_bytes: downloaded as u64,
                total_bytes: total.or(estimate).map(|bytes| bytes as u64),
                speed,
            }))
        }
        _ => None,
    }
}

fn parse_number(field: &str) -> Option<f64> {
    match field.trim() {
        "" | "NA" | "None" => None,
        value => value.parse::<f64>().ok().filter(|n| n.is_finite() && *n >= 0.0),
    }
}
