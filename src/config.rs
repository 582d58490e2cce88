use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://127.0.0.1:5173"];
const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;
const DEFAULT_YT_DLP_TIMEOUT_SECONDS: u64 = 180;
const DEFAULT_FFMPEG_TIMEOUT_SECONDS: u64 = 600;
const DEFAULT_MIN_PLAUSIBLE_BYTES: u64 = 1024;
const DEFAULT_STALE_STAGING_SECONDS: u64 = 2 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub allowed_origins: Vec<String>,
    pub download_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub data_dir: PathBuf,
    pub yt_dlp_bin: String,
    pub ffmpeg_bin: String,
    pub yt_dlp_timeout: Duration,
    pub ffmpeg_timeout: Duration,
    pub ffmpeg_preset: String,
    pub min_plausible_bytes: u64,
    pub max_concurrent_downloads: usize,
    pub stale_staging_after: Duration,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from any variable source; invalid values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |name: &str| lookup(name).and_then(|value| non_empty(&value).map(String::from));
        let number = |name: &str| text(name).and_then(|value| value.parse::<u64>().ok());

        let download_dir = text("DOWNLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("downloads"));
        let staging_dir = text("STAGING_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| download_dir.join(".staging"));

        Self {
            bind_addr: resolve_bind_addr(text("APP_ADDR"), text("PORT")),
            allowed_origins: text("ALLOWED_ORIGINS")
                .map(|value| split_list(&value))
                .filter(|origins| !origins.is_empty())
                .unwrap_or_else(|| DEFAULT_ORIGINS.iter().map(ToString::to_string).collect()),
            download_dir,
            staging_dir,
            data_dir: text("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            yt_dlp_bin: text("YT_DLP_BIN").unwrap_or_else(|| "yt-dlp".to_string()),
            ffmpeg_bin: text("FFMPEG_BIN").unwrap_or_else(|| "ffmpeg".to_string()),
            yt_dlp_timeout: Duration::from_secs(
                number("YT_DLP_TIMEOUT_SECONDS")
                    .filter(|value| *value > 0)
                    .unwrap_or(DEFAULT_YT_DLP_TIMEOUT_SECONDS),
            ),
            ffmpeg_timeout: Duration::from_secs(
                number("FFMPEG_TIMEOUT_SECONDS")
                    .filter(|value| *value > 0)
                    .unwrap_or(DEFAULT_FFMPEG_TIMEOUT_SECONDS),
            ),
            ffmpeg_preset: text("FFMPEG_PRESET").unwrap_or_else(|| "fast".to_string()),
            min_plausible_bytes: number("MIN_PLAUSIBLE_BYTES")
                .unwrap_or(DEFAULT_MIN_PLAUSIBLE_BYTES),
            max_concurrent_downloads: number("MAX_CONCURRENT_DOWNLOADS")
                .and_then(|value| usize::try_from(value).ok())
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_MAX_CONCURRENT_DOWNLOADS),
            stale_staging_after: Duration::from_secs(
                number("STALE_STAGING_SECONDS").unwrap_or(DEFAULT_STALE_STAGING_SECONDS),
            ),
        }
    }

    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join("records.json")
    }
}

fn resolve_bind_addr(app_addr: Option<String>, port: Option<String>) -> String {
    if let Some(configured) = app_addr {
        return configured;
    }

    if let Some(port) = port.and_then(|value| value.parse::<u16>().ok()) {
        return format!("0.0.0.0:{port}");
    }

    DEFAULT_BIND_ADDR.to_string()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
