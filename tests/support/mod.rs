#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use link2video::catalog::RawTrack;
use link2video::store::{JsonRecordStore, MediaRecord, RecordStore};
use link2video::tools::{
    DownloadJob, DownloadReport, Extractor, MediaInfo, TranscodeJob, TranscodeMode, Transcoder,
};
use link2video::{Error, MediaService, Result, ServiceOptions};
use tempfile::TempDir;
use url::Url;
use uuid::Uuid;

pub const MIN_BYTES: u64 = 1024;

/// Extractor that writes a file of a fixed size into staging.
pub struct FakeExtractor {
    pub title: String,
    pub extension: String,
    pub size: usize,
    pub leave_partial: bool,
    pub unavailable: bool,
    pub jobs: Mutex<Vec<DownloadJob>>,
}

impl FakeExtractor {
    pub fn producing(title: &str, extension: &str, size: usize) -> Self {
        Self {
            title: title.to_string(),
            extension: extension.to_string(),
            size,
            leave_partial: false,
            unavailable: false,
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn selectors(&self) -> Vec<Option<String>> {
        self.jobs
            .lock()
            .expect("jobs lock")
            .iter()
            .map(|job| job.selection.selector().map(str::to_string))
            .collect()
    }
}

fn combined_track(ext: &str, height: u32) -> RawTrack {
    RawTrack {
        format_id: Some(format!("{ext}-{height}")),
        ext: Some(ext.to_string()),
        vcodec: Some("avc1".to_string()),
        acodec: Some("mp4a.40.2".to_string()),
        height: Some(height),
        filesize: Some(f64::from(height) * 10_000.0),
        ..RawTrack::default()
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    fn name(&self) -> &'static str {
        "fake-extractor"
    }

    async fn probe(&self, _url: &Url) -> Result<MediaInfo> {
        if self.unavailable {
            return Err(Error::ToolUnavailable {
                tool: "yt-dlp".to_string(),
            });
        }
        Ok(MediaInfo {
            title: Some(self.title.clone()),
            extractor_key: Some("Youtube".to_string()),
            uploader: Some("Uploader".to_string()),
            formats: vec![combined_track("mp4", 360), combined_track("mp4", 720)],
            ..MediaInfo::default()
        })
    }

    async fn download(&self, job: &DownloadJob) -> Result<DownloadReport> {
        self.jobs.lock().expect("jobs lock").push(job.clone());

        let path = job
            .staging_dir
            .join(format!("{}.{}", job.basename, self.extension));
        tokio::fs::write(&path, vec![7u8; self.size])
            .await
            .expect("write fake download");
        if self.leave_partial {
            let partial = job.staging_dir.join(format!("{}.f137.mp4.part", job.basename));
            tokio::fs::write(&partial, b"partial")
                .await
                .expect("write partial");
        }

        Ok(DownloadReport {
            diagnostics: String::new(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    SucceedAfter(Duration),
    FailFirst,
    AlwaysFail,
}

/// Transcoder that records attempts and writes plausible output on success.
pub struct FakeTranscoder {
    pub behavior: Behavior,
    pub calls: Mutex<Vec<TranscodeMode>>,
}

impl FakeTranscoder {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn modes(&self) -> Vec<TranscodeMode> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    fn name(&self) -> &'static str {
        "fake-transcoder"
    }

    async fn transcode(&self, job: &TranscodeJob) -> Result<()> {
        let attempt = {
            let mut calls = self.calls.lock().expect("calls lock");
            calls.push(job.mode);
            calls.len()
        };

        if let Behavior::SucceedAfter(delay) = self.behavior {
            tokio::time::sleep(delay).await;
        }

        let fail = match self.behavior {
            Behavior::Succeed | Behavior::SucceedAfter(_) => false,
            Behavior::FailFirst => attempt == 1,
            Behavior::AlwaysFail => true,
        };
        if fail {
            tokio::fs::write(&job.output, b"broken")
                .await
                .expect("write partial output");
            return Err(Error::ConversionFailed(format!(
                "fallo simulado en intento {attempt}"
            )));
        }

        tokio::fs::write(&job.output, vec![1u8; 4096])
            .await
            .expect("write output");
        Ok(())
    }
}

/// Store whose every operation fails.
pub struct BrokenStore;

#[async_trait]
impl RecordStore for BrokenStore {
    async fn insert(&self, _record: MediaRecord) -> Result<()> {
        Err(Error::PersistenceFailed("disco lleno".to_string()))
    }

    async fn list(&self) -> Result<Vec<MediaRecord>> {
        Err(Error::PersistenceFailed("disco lleno".to_string()))
    }

    async fn get(&self, _id: Uuid) -> Result<Option<MediaRecord>> {
        Err(Error::PersistenceFailed("disco lleno".to_string()))
    }

    async fn delete(&self, _id: Uuid) -> Result<Option<MediaRecord>> {
        Err(Error::PersistenceFailed("disco lleno".to_string()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub extractor: Arc<FakeExtractor>,
    pub transcoder: Arc<FakeTranscoder>,
    pub service: Arc<MediaService>,
}

impl Harness {
    pub async fn new(extractor: FakeExtractor, behavior: Behavior) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonRecordStore::open(dir.path().join("data").join("records.json"))
            .await
            .expect("open store");
        Self::with_store(dir, extractor, behavior, Arc::new(store)).await
    }

    pub async fn with_store(
        dir: TempDir,
        extractor: FakeExtractor,
        behavior: Behavior,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let extractor = Arc::new(extractor);
        let transcoder = Arc::new(FakeTranscoder::new(behavior));
        let service = MediaService::new(
            extractor.clone(),
            transcoder.clone(),
            store,
            ServiceOptions {
                download_dir: dir.path().join("downloads"),
                staging_dir: dir.path().join("downloads").join(".staging"),
                min_plausible_bytes: MIN_BYTES,
                max_concurrent_downloads: 2,
                stale_staging_after: Duration::from_secs(3600),
            },
        );
        service.prepare_dirs().await.expect("prepare dirs");

        Self {
            dir,
            extractor,
            transcoder,
            service: Arc::new(service),
        }
    }

    pub fn download_dir(&self) -> PathBuf {
        self.service.options().download_dir.clone()
    }

    pub fn staging_entries(&self) -> Vec<String> {
        std::fs::read_dir(&self.service.options().staging_dir)
            .expect("read staging")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect()
    }
}
