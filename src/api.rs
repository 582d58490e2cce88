use std::collections::HashSet;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path as UrlPath, State},
    http::{
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{Error, ErrorKind};
use crate::pipeline::{FormatsReport, MediaService};
use crate::selection::RequestSpec;
use crate::store::MediaRecord;

const DEFAULT_QUALITY: &str = "720p";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MediaService>,
}

#[derive(Debug, Deserialize)]
struct InfoRequest {
    url: String,
}

#[derive(Debug, Deserialize)]
struct DownloadRequest {
    url: String,
    format: Option<String>,
    quality: Option<String>,
}

#[derive(Debug, Serialize)]
struct DownloadResponse {
    id: Uuid,
    title: String,
    filename: String,
    format: String,
    quality: String,
    platform: String,
    download_url: String,
    size_bytes: u64,
    created_at: DateTime<Utc>,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    code: Option<&'static str>,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            code: Some(ErrorKind::InvalidRequest.code()),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            code: Some("NOT_FOUND"),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            code: None,
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let kind = error.kind();
        let status = match kind {
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::AcquisitionFailed => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::ToolUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::ConversionFailed | ErrorKind::PersistenceFailed | ErrorKind::Io => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!("Fallo {}: {error}", kind.code());
        }

        Self {
            status,
            message: error.to_string(),
            code: Some(kind.code()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            code: self.code,
        });

        (self.status, body).into_response()
    }
}

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .route("/api/video/info", post(video_info))
        .route("/api/video/download", post(download_video))
        .route("/api/video/list", get(list_videos))
        .route("/api/video/delete/{id}", delete(delete_video))
        .route("/downloads/{filename}", get(serve_download))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({"message": "Link2Video API en ejecucion correctamente"}))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn video_info(
    State(state): State<AppState>,
    Json(payload): Json<InfoRequest>,
) -> Result<Json<FormatsReport>, ApiError> {
    let report = state.service.formats(&payload.url).await?;
    Ok(Json(report))
}

async fn download_video(
    State(state): State<AppState>,
    Json(payload): Json<DownloadRequest>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let quality = payload.quality.as_deref().unwrap_or(DEFAULT_QUALITY);
    let request = RequestSpec::new(&payload.url, payload.format.as_deref(), Some(quality))?;
    let artifact = state.service.process(request).await?;

    Ok(Json(DownloadResponse {
        id: artifact.id,
        title: artifact.title,
        filename: artifact.filename,
        format: artifact.format,
        quality: artifact.quality,
        platform: artifact.platform,
        download_url: artifact.download_url,
        size_bytes: artifact.size_bytes,
        created_at: artifact.created_at,
        message: "Descarga lista",
    }))
}

async fn list_videos(State(state): State<AppState>) -> Result<Json<Vec<MediaRecord>>, ApiError> {
    Ok(Json(state.service.list().await?))
}

async fn delete_video(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = Uuid::parse_str(id.trim()).map_err(|_| ApiError::bad_request("ID invalido"))?;

    if !state.service.delete(id).await? {
        return Err(ApiError::not_found("Video no encontrado"));
    }

    Ok(Json(serde_json::json!({
        "message": "Video eliminado correctamente",
        "id": id,
    })))
}

async fn serve_download(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> Result<Response, ApiError> {
    let path = state
        .service
        .file_path(&filename)
        .ok_or_else(|| ApiError::bad_request("Nombre de archivo invalido."))?;

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => return Err(ApiError::not_found("Archivo no encontrado.")),
        Err(error) if error.kind() == IoErrorKind::NotFound => {
            return Err(ApiError::not_found("Archivo no encontrado."));
        }
        Err(error) => {
            return Err(ApiError::internal(format!(
                "No se pudo leer metadata del archivo: {error}"
            )));
        }
    };

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|error| ApiError::internal(format!("No se pudo leer el archivo: {error}")))?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(content_type_for_filename(&filename)),
    );
    headers.insert(
        CONTENT_LENGTH,
        HeaderValue::from_str(&metadata.len().to_string())
            .map_err(|_| ApiError::internal("No se pudo crear el tamano de descarga."))?,
    );
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&build_content_disposition(&filename))
            .map_err(|_| ApiError::internal("No se pudo crear la cabecera de descarga."))?,
    );
    headers.insert(
        HeaderName::from_static("x-download-filename"),
        HeaderValue::from_str(&sanitize_ascii_filename(&filename))
            .map_err(|_| ApiError::internal("No se pudo crear el nombre del archivo."))?,
    );

    Ok((headers, body).into_response())
}

pub fn build_cors_layer(origins: &[String]) -> Result<CorsLayer, Error> {
    let normalized_origins = origins
        .iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| {
                Error::invalid(format!(
                    "Origen invalido en ALLOWED_ORIGINS: {origin}. Usa valores tipo https://dominio.com"
                ))
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    let allowed_origins = Arc::new(normalized_origins);
    let allow_origin = AllowOrigin::predicate({
        let allowed_origins = Arc::clone(&allowed_origins);
        move |origin: &HeaderValue, _| {
            let normalized = origin.to_str().ok().and_then(normalize_origin);
            let allowed = normalized
                .as_ref()
                .is_some_and(|value| allowed_origins.contains(value));
            debug!(
                "CORS origin check raw={:?} normalized={:?} allowed={}",
                origin, normalized, allowed
            );
            allowed
        }
    });
    info!(
        "CORS allow-list cargada con {} origen(es): {:?}",
        allowed_origins.len(),
        allowed_origins
    );

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
        .expose_headers([
            CONTENT_DISPOSITION,
            HeaderName::from_static("x-download-filename"),
        ]))
}

fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    match parsed.port().filter(|explicit| *explicit != default_port) {
        Some(port) => Some(format!("{scheme}://{host}:{port}")),
        None => Some(format!("{scheme}://{host}")),
    }
}

fn content_type_for_filename(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "wav" => "audio/wav",
        "ogg" | "opus" => "audio/ogg",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}

fn build_content_disposition(filename: &str) -> String {
    let safe_ascii = sanitize_ascii_filename(filename);
    format!(
        "attachment; filename=\"{safe_ascii}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

fn sanitize_ascii_filename(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric()
                || matches!(character, '.' | '-' | '_' | ' ' | '(' | ')')
            {
                character
            } else {
                '_'
            }
        })
        .collect();

    let compact = sanitized.trim();
    if compact.is_empty() {
        "download.bin".to_string()
    } else {
        compact.to_string()
    }
}
