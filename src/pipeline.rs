use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::{self, SourceTrack};
use crate::error::{Error, Result};
use crate::reconcile::{self, ReconcileAction};
use crate::selection::{self, RequestSpec};
use crate::staging;
use crate::store::{MediaRecord, RecordStore};
use crate::tools::{DownloadJob, Extractor, Transcoder};
use crate::transcode;

pub const DOWNLOAD_ROUTE_PREFIX: &str = "/downloads";

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub download_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub min_plausible_bytes: u64,
    pub max_concurrent_downloads: usize,
    pub stale_staging_after: Duration,
}

/// Read-only view of what a URL offers.
#[derive(Debug, Clone, Serialize)]
pub struct FormatsReport {
    pub title: String,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub platform: String,
    pub formats: Vec<SourceTrack>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalArtifact {
    pub id: Uuid,
    pub title: String,
    pub filename: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub download_url: String,
    pub format: String,
    pub quality: String,
    pub platform: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl FinalArtifact {
    fn to_record(&self) -> MediaRecord {
        MediaRecord {
            id: self.id,
            title: self.title.clone(),
            filename: self.filename.clone(),
            format: self.format.clone(),
            quality: self.quality.clone(),
            platform: self.platform.clone(),
            download_url: self.download_url.clone(),
            created_at: self.created_at,
        }
    }
}

struct Placed {
    path: PathBuf,
    filename: String,
    size_bytes: u64,
}

/// The download pipeline: probe, select, acquire, reconcile, record.
pub struct MediaService {
    extractor: Arc<dyn Extractor>,
    transcoder: Arc<dyn Transcoder>,
    store: Arc<dyn RecordStore>,
    options: ServiceOptions,
    download_slots: Arc<Semaphore>,
}

impl MediaService {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        transcoder: Arc<dyn Transcoder>,
        store: Arc<dyn RecordStore>,
        options: ServiceOptions,
    ) -> Self {
        let download_slots = Arc::new(Semaphore::new(options.max_concurrent_downloads.max(1)));
        Self {
            extractor,
            transcoder,
            store,
            options,
            download_slots,
        }
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    pub async fn prepare_dirs(&self) -> Result<()> {
        for dir in [&self.options.download_dir, &self.options.staging_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|error| Error::io("crear carpeta", dir, error))?;
        }
        staging::cleanup_stale(&self.options.staging_dir, self.options.stale_staging_after).await;
        Ok(())
    }

    pub async fn formats(&self, url: &str) -> Result<FormatsReport> {
        let request = RequestSpec::new(url, None, None)?;
        let info = self.extractor.probe(&request.url).await?;
        let formats = catalog::normalize(&info.formats);

        Ok(FormatsReport {
            title: info.title.clone().unwrap_or_default(),
            thumbnail: info.thumbnail.clone(),
            duration: info.duration,
            uploader: info.display_uploader(),
            platform: info
                .extractor_key
                .clone()
                .unwrap_or_else(|| selection::platform_from_url(&request.url)),
            formats,
        })
    }

    /// Runs one download to completion on its own task. Dropping the returned
    /// future does not interrupt the run, so staging cleanup always happens.
    pub async fn process(self: &Arc<Self>, request: RequestSpec) -> Result<FinalArtifact> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.run_pipeline(request).await })
            .await
            .map_err(|error| Error::acquisition(format!("La tarea de descarga fallo: {error}")))?
    }

    async fn run_pipeline(&self, request: RequestSpec) -> Result<FinalArtifact> {
        let _permit = self
            .download_slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::acquisition("No se pudo reservar capacidad de descarga."))?;
        staging::cleanup_stale(&self.options.staging_dir, self.options.stale_staging_after).await;

        let info = self.extractor.probe(&request.url).await?;
        let title = info
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or("video")
            .to_string();
        let platform = info
            .extractor_key
            .clone()
            .unwrap_or_else(|| selection::platform_from_url(&request.url));

        let tracks = catalog::normalize(&info.formats);
        let choice = selection::select(&tracks, &request);
        let basename = staging::working_basename();
        info!(
            "Procesando {} como .{} (calidad {:?}) con {:?} [{basename}]",
            request.url, request.extension, request.quality, choice
        );

        let job = DownloadJob {
            url: request.url.clone(),
            selection: choice,
            staging_dir: self.options.staging_dir.clone(),
            basename: basename.clone(),
        };

        let outcome = self.acquire_and_reconcile(&job, &request, &title).await;
        let removed = staging::cleanup_basename(&self.options.staging_dir, &basename).await;
        if removed > 0 {
            info!("Limpieza de staging {basename}: {removed} archivo(s)");
        }
        let placed = outcome?;

        let artifact = FinalArtifact {
            id: Uuid::new_v4(),
            title,
            download_url: format!(
                "{DOWNLOAD_ROUTE_PREFIX}/{}",
                urlencoding::encode(&placed.filename)
            ),
            filename: placed.filename,
            path: placed.path,
            format: request.extension.clone(),
            quality: request.quality.clone(),
            platform,
            size_bytes: placed.size_bytes,
            created_at: Utc::now(),
        };

        if let Err(error) = self.store.insert(artifact.to_record()).await {
            warn!(
                "No se pudo guardar el registro de {}: {error}",
                artifact.filename
            );
        }

        info!(
            "Descarga lista: {} ({} bytes)",
            artifact.filename, artifact.size_bytes
        );
        Ok(artifact)
    }

    async fn acquire_and_reconcile(
        &self,
        job: &DownloadJob,
        request: &RequestSpec,
        title: &str,
    ) -> Result<Placed> {
        let min_bytes = self.options.min_plausible_bytes;
        let report = self.extractor.download(job).await?;

        let artifact = staging::find_artifact(&job.staging_dir, &job.basename, min_bytes)
            .await?
            .ok_or_else(|| {
                let detail = if report.diagnostics.is_empty() {
                    "sin detalles".to_string()
                } else {
                    report.diagnostics.clone()
                };
                Error::acquisition(format!(
                    "No se encontro un archivo descargado valido ({}): {detail}",
                    self.extractor.name()
                ))
            })?;

        let action = reconcile::plan(&artifact.extension, request);
        let ready = match action {
            ReconcileAction::Accept => artifact.path.clone(),
            ReconcileAction::AudioExtract | ReconcileAction::Convert => {
                let output = job
                    .staging_dir
                    .join(format!("{}.converted.{}", job.basename, request.extension));
                transcode::run(
                    self.transcoder.as_ref(),
                    action,
                    &artifact.path,
                    &output,
                    &request.extension,
                )
                .await?;
                output
            }
        };

        let size_bytes = reconcile::verify_plausible(&ready, min_bytes).await?;
        let filename = reconcile::final_filename(title, &request.extension);
        let destination = self.options.download_dir.join(&filename);
        let path = reconcile::place_final(&ready, &destination).await?;

        Ok(Placed {
            path,
            filename,
            size_bytes,
        })
    }

    pub async fn list(&self) -> Result<Vec<MediaRecord>> {
        self.store.list().await
    }

    /// Removes a record and its file. A file that is already gone is fine,
    /// and a file still referenced by another record is left in place.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let Some(record) = self.store.get(id).await? else {
            return Ok(false);
        };

        let shared = self
            .store
            .list()
            .await?
            .iter()
            .any(|other| other.id != id && other.filename == record.filename);
        if shared {
            info!(
                "{} sigue en uso por otro registro, se conserva el archivo",
                record.filename
            );
        } else if let Some(path) = self.file_path(&record.filename) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!("Archivo eliminado: {:?}", path),
                Err(error) if error.kind() == ErrorKind::NotFound => {
                    info!("El archivo {:?} ya no existe", path);
                }
                Err(error) => return Err(Error::io("eliminar archivo", &path, error)),
            }
        }

        Ok(self.store.delete(id).await?.is_some())
    }

    /// Resolves a public filename inside the download directory.
    pub fn file_path(&self, filename: &str) -> Option<PathBuf> {
        is_servable_name(filename).then(|| self.options.download_dir.join(filename))
    }
}

fn is_servable_name(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.starts_with('.')
        && !filename.contains(['/', '\\'])
        && Path::new(filename).file_name().is_some_and(|name| name == filename)
}
