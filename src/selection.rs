use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::catalog::{SourceTrack, TrackKind};
use crate::error::{Error, Result};

pub const DEFAULT_EXTENSION: &str = "mp4";
pub const AUDIO_ONLY_EXTENSIONS: [&str; 6] = ["mp3", "m4a", "wav", "opus", "aac", "ogg"];

const AUDIO_SELECTOR: &str = "bestaudio/best";
const BEST_SELECTOR: &str = "bestvideo+bestaudio/best";
const MAX_EXTENSION_LEN: usize = 8;

static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("digit run pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTarget {
    Height(u32),
    Best,
    Unrecognized,
}

impl QualityTarget {
    pub fn parse(label: &str) -> Self {
        let label = label.trim().to_ascii_lowercase();
        if label.is_empty() || matches!(label.as_str(), "best" | "auto" | "max" | "highest") {
            return Self::Best;
        }

        DIGIT_RUN
            .find_iter(&label)
            .map(|run| run.as_str())
            .find(|run| (3..=4).contains(&run.len()))
            .and_then(|run| run.parse::<u32>().ok())
            .filter(|height| *height > 0)
            .map(Self::Height)
            .unwrap_or(Self::Unrecognized)
    }

    pub fn height(self) -> Option<u32> {
        match self {
            Self::Height(height) => Some(height),
            _ => None,
        }
    }
}

/// What the caller asked for, validated before any tool runs.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub url: Url,
    pub extension: String,
    pub quality: String,
    pub target: QualityTarget,
}

impl RequestSpec {
    pub fn new(url: &str, format: Option<&str>, quality: Option<&str>) -> Result<Self> {
        let url = parse_source_url(url)?;
        let extension = normalize_extension(format.unwrap_or(DEFAULT_EXTENSION))?;
        let quality = quality.map(str::trim).unwrap_or_default().to_string();
        let target = QualityTarget::parse(&quality);

        Ok(Self {
            url,
            extension,
            quality,
            target,
        })
    }

    pub fn is_audio_only(&self) -> bool {
        is_audio_extension(&self.extension)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionResult {
    Selector(String),
    NoPreference,
}

impl SelectionResult {
    pub fn selector(&self) -> Option<&str> {
        match self {
            Self::Selector(selector) => Some(selector),
            Self::NoPreference => None,
        }
    }
}

pub fn is_audio_extension(extension: &str) -> bool {
    AUDIO_ONLY_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
}

/// Picks what to ask the extraction tool for.
///
/// Audio requests always resolve to the best audio stream and leave the
/// container to the transcode step. Video requests get a height-bounded
/// merge selector when the quality label names a height, an unbounded one
/// when it asks for the best, and otherwise fall back to the best combined
/// track already in the requested container.
pub fn select(catalog: &[SourceTrack], request: &RequestSpec) -> SelectionResult {
    if request.is_audio_only() {
        return SelectionResult::Selector(AUDIO_SELECTOR.to_string());
    }

    match request.target {
        QualityTarget::Height(height) => SelectionResult::Selector(format!(
            "bestvideo[height<={height}]+bestaudio/best[height<={height}]/best"
        )),
        QualityTarget::Best => SelectionResult::Selector(BEST_SELECTOR.to_string()),
        QualityTarget::Unrecognized => fallback_selection(catalog, &request.extension),
    }
}

fn fallback_selection(catalog: &[SourceTrack], extension: &str) -> SelectionResult {
    catalog
        .iter()
        .filter(|track| track.kind == TrackKind::VideoWithAudio)
        .filter(|track| track.extension == extension)
        .filter(|track| !track.format_id.is_empty())
        .max_by_key(|track| track.height.unwrap_or(0))
        .map(|track| SelectionResult::Selector(track.format_id.clone()))
        .unwrap_or(SelectionResult::NoPreference)
}

fn parse_source_url(input: &str) -> Result<Url> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::invalid("Ingresa una URL valida."));
    }

    let parsed =
        Url::parse(input).map_err(|_| Error::invalid(format!("URL invalida: {input}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::invalid("Solo se aceptan URLs http o https."));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::invalid(format!("URL sin dominio: {input}")));
    }

    Ok(parsed)
}

fn normalize_extension(value: &str) -> Result<String> {
    let extension = value.trim().trim_start_matches('.').to_ascii_lowercase();
    if extension.is_empty() {
        return Ok(DEFAULT_EXTENSION.to_string());
    }
    if extension.len() > MAX_EXTENSION_LEN
        || !extension.chars().all(|character| character.is_ascii_alphanumeric())
    {
        return Err(Error::invalid(format!("Formato no valido: {value}")));
    }
    Ok(extension)
}

/// Label for the hosting platform, derived from the URL host.
pub fn platform_from_url(url: &Url) -> String {
    url.host_str()
        .map(|host| host.trim_start_matches("www.").trim_start_matches("m."))
        .filter(|host| !host.is_empty())
        .unwrap_or("unknown")
        .to_string()
}
