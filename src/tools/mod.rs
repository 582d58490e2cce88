//! Narrow capability interfaces over the external binaries.
//!
//! The pipeline only talks to [`Extractor`] and [`Transcoder`]; the yt-dlp
//! and ffmpeg implementations live in the submodules and tests swap in fakes.

pub mod ffmpeg;
pub mod process;
pub mod ytdlp;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::catalog::RawTrack;
use crate::error::Result;
use crate::selection::SelectionResult;

pub use ffmpeg::Ffmpeg;
pub use ytdlp::YtDlp;

/// Metadata reported by the extraction tool for a single URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaInfo {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub uploader_id: Option<String>,
    pub channel: Option<String>,
    pub extractor_key: Option<String>,
    #[serde(default)]
    pub formats: Vec<RawTrack>,
}

impl MediaInfo {
    pub fn display_uploader(&self) -> Option<String> {
        self.uploader
            .as_ref()
            .or(self.uploader_id.as_ref())
            .or(self.channel.as_ref())
            .cloned()
    }
}

#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub url: Url,
    pub selection: SelectionResult,
    pub staging_dir: PathBuf,
    pub basename: String,
}

impl DownloadJob {
    /// Output template handed to the tool; it picks the extension.
    pub fn output_template(&self) -> String {
        format!(
            "{}/{}.%(ext)s",
            self.staging_dir.to_string_lossy(),
            self.basename
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    pub diagnostics: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeMode {
    AudioCopy,
    AudioEncode,
    StreamCopy,
    Reencode,
}

#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub target_extension: String,
    pub mode: TranscodeMode,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn probe(&self, url: &Url) -> Result<MediaInfo>;

    async fn download(&self, job: &DownloadJob) -> Result<DownloadReport>;
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs one attempt. Failures are `ConversionFailed` carrying the tool's
    /// diagnostics, or `ToolUnavailable` when the binary cannot be started.
    async fn transcode(&self, job: &TranscodeJob) -> Result<()>;
}
