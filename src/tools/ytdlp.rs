use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use super::process::{self, RunFailure};
use super::{DownloadJob, DownloadReport, Extractor, MediaInfo};
use crate::error::{Error, Result};

pub struct YtDlp {
    binary: String,
    timeout: Duration,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<std::process::Output> {
        process::run(&self.binary, &args, self.timeout)
            .await
            .map_err(|failure| match failure {
                RunFailure::NotFound => Error::ToolUnavailable {
                    tool: self.binary.clone(),
                },
                RunFailure::TimedOut(limit) => Error::acquisition(format!(
                    "La descarga excedio el tiempo limite de {}s. Intenta con otra URL o formato.",
                    limit.as_secs()
                )),
                RunFailure::Spawn(error) => {
                    Error::acquisition(format!("No se pudo ejecutar {}: {error}", self.binary))
                }
                RunFailure::Exited { stderr, .. } => {
                    Error::acquisition(run_error_message(&stderr))
                }
            })
    }
}

#[async_trait]
impl Extractor for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe(&self, url: &Url) -> Result<MediaInfo> {
        let output = self
            .run(vec![
                "-J".to_string(),
                "--no-playlist".to_string(),
                "--no-warnings".to_string(),
                url.to_string(),
            ])
            .await?;

        serde_json::from_slice(&output.stdout).map_err(|error| {
            warn!("No se pudo interpretar JSON de yt-dlp para URL {url}: {error}");
            Error::acquisition(
                "No se pudieron obtener metadatos de la URL. Reintenta mas tarde.",
            )
        })
    }

    async fn download(&self, job: &DownloadJob) -> Result<DownloadReport> {
        let output = self.run(download_args(job)).await?;
        debug!("yt-dlp termino la descarga de {}", job.basename);

        Ok(DownloadReport {
            diagnostics: process::diagnostic_tail(&String::from_utf8_lossy(&output.stderr)),
        })
    }
}

fn download_args(job: &DownloadJob) -> Vec<String> {
    let mut args = vec![
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--no-part".to_string(),
        "--newline".to_string(),
        "-o".to_string(),
        job.output_template(),
    ];

    if let Some(selector) = job.selection.selector() {
        args.push("-f".to_string());
        args.push(selector.to_string());
    }

    args.push(job.url.to_string());
    args
}

fn run_error_message(stderr: &str) -> String {
    let message = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp no pudo completar la operacion")
        .to_string();
    let lower = message.to_ascii_lowercase();

    if lower.contains("unsupported url") {
        "URL no soportada o invalida para descarga.".to_string()
    } else if lower.contains("requested format is not available") {
        "El formato solicitado no esta disponible para esta URL.".to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::selection::SelectionResult;

    fn job(selection: SelectionResult) -> DownloadJob {
        DownloadJob {
            url: Url::parse("https://youtu.be/abc").expect("url"),
            selection,
            staging_dir: PathBuf::from("/srv/downloads/.staging"),
            basename: "dl-1-abc".to_string(),
        }
    }

    #[test]
    fn download_args_carry_selector_and_template() {
        let args = download_args(&job(SelectionResult::Selector("bestaudio/best".into())));
        let template = args
            .iter()
            .position(|arg| arg == "-o")
            .and_then(|index| args.get(index + 1));
        assert_eq!(
            template.map(String::as_str),
            Some("/srv/downloads/.staging/dl-1-abc.%(ext)s")
        );
        let selector = args
            .iter()
            .position(|arg| arg == "-f")
            .and_then(|index| args.get(index + 1));
        assert_eq!(selector.map(String::as_str), Some("bestaudio/best"));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/abc"));
    }

    #[test]
    fn no_preference_leaves_format_to_the_tool() {
        let args = download_args(&job(SelectionResult::NoPreference));
        assert!(!args.iter().any(|arg| arg == "-f"));
    }

    #[test]
    fn error_message_uses_last_stderr_line() {
        let stderr = "WARNING: something\nERROR: [generic] Unsupported URL: https://a.b\n";
        assert_eq!(
            run_error_message(stderr),
            "URL no soportada o invalida para descarga."
        );
        assert_eq!(
            run_error_message("ERROR: HTTP Error 403: Forbidden\n\n"),
            "ERROR: HTTP Error 403: Forbidden"
        );
        assert_eq!(
            run_error_message(""),
            "yt-dlp no pudo completar la operacion"
        );
    }

    #[test]
    fn download_args_leave_discovery_to_the_staging_scan() {
        let args = download_args(&job(SelectionResult::NoPreference));
        assert!(!args.iter().any(|arg| arg == "--print"));
        assert!(args.iter().any(|arg| arg == "--no-part"));
    }

    #[tokio::test]
    async fn missing_binary_maps_to_tool_unavailable() {
        let tool = YtDlp::new("link2video-missing-yt-dlp", Duration::from_secs(5));
        let url = Url::parse("https://youtu.be/abc").expect("url");
        let error = tool.probe(&url).await.expect_err("binary is missing");
        assert_eq!(error.kind(), crate::error::ErrorKind::ToolUnavailable);
    }
}
