use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One entry of the extraction tool's `formats` array, as reported.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTrack {
    #[serde(default)]
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub height: Option<u32>,
    pub fps: Option<f32>,
    pub tbr: Option<f32>,
    pub abr: Option<f32>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
    pub format_note: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    VideoWithAudio,
    VideoOnly,
    Audio,
    Unknown,
}

impl TrackKind {
    pub fn has_video(self) -> bool {
        matches!(self, Self::VideoWithAudio | Self::VideoOnly)
    }

    fn rank(self) -> u8 {
        match self {
            Self::VideoWithAudio | Self::VideoOnly => 0,
            Self::Audio => 1,
            Self::Unknown => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceTrack {
    pub format_id: String,
    pub extension: String,
    pub quality: String,
    pub kind: TrackKind,
    pub height: Option<u32>,
    pub fps: Option<f32>,
    pub bitrate_kbps: Option<f32>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub size_bytes: Option<u64>,
    pub size: Option<String>,
}

impl SourceTrack {
    fn from_raw(raw: &RawTrack) -> Self {
        let vcodec = present_codec(raw.vcodec.as_deref());
        let acodec = present_codec(raw.acodec.as_deref());
        let kind = match (vcodec.is_some(), acodec.is_some()) {
            (true, true) => TrackKind::VideoWithAudio,
            (true, false) => TrackKind::VideoOnly,
            (false, true) => TrackKind::Audio,
            (false, false) => TrackKind::Unknown,
        };
        let height = raw.height.filter(|height| *height > 0);
        let bitrate_kbps = raw.tbr.or(raw.abr).filter(|rate| *rate > 0.0);
        let size_bytes = raw
            .filesize
            .or(raw.filesize_approx)
            .filter(|size| *size >= 0.0)
            .map(|size| size as u64);

        Self {
            format_id: raw.format_id.clone().unwrap_or_default(),
            extension: raw
                .ext
                .as_deref()
                .map(|ext| ext.trim().to_ascii_lowercase())
                .unwrap_or_default(),
            quality: quality_label(raw, height, bitrate_kbps),
            kind,
            height,
            fps: raw.fps.filter(|fps| *fps > 0.0),
            bitrate_kbps,
            vcodec,
            acodec,
            size_bytes,
            size: size_bytes.map(format_size),
        }
    }

    fn label_kbps(&self) -> u64 {
        let digits: String = self.quality.chars().filter(char::is_ascii_digit).collect();
        digits.parse().unwrap_or(0)
    }
}

/// Builds the ranked catalog: one entry per `(extension, quality)` pair,
/// video first, then audio, then anything unclassified.
pub fn normalize(raw_tracks: &[RawTrack]) -> Vec<SourceTrack> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut kept: HashMap<(String, String), SourceTrack> = HashMap::new();

    for track in raw_tracks.iter().map(SourceTrack::from_raw) {
        let key = (track.extension.clone(), track.quality.clone());
        match kept.get(&key) {
            Some(previous) if !replaces(previous, &track) => {}
            Some(_) => {
                kept.insert(key, track);
            }
            None => {
                order.push(key.clone());
                kept.insert(key, track);
            }
        }
    }

    let mut catalog: Vec<SourceTrack> = order
        .into_iter()
        .filter_map(|key| kept.remove(&key))
        .collect();
    catalog.sort_by(compare_for_presentation);
    catalog
}

fn replaces(previous: &SourceTrack, candidate: &SourceTrack) -> bool {
    let previous_size = previous.size_bytes.unwrap_or(0);
    let candidate_size = candidate.size_bytes.unwrap_or(0);
    match candidate_size.cmp(&previous_size) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => candidate.height.unwrap_or(0) > previous.height.unwrap_or(0),
    }
}

fn compare_for_presentation(a: &SourceTrack, b: &SourceTrack) -> Ordering {
    a.kind.rank().cmp(&b.kind.rank()).then_with(|| match a.kind.rank() {
        0 => b
            .height
            .unwrap_or(0)
            .cmp(&a.height.unwrap_or(0))
            .then_with(|| {
                b.fps
                    .unwrap_or(0.0)
                    .partial_cmp(&a.fps.unwrap_or(0.0))
                    .unwrap_or(Ordering::Equal)
            }),
        1 => b.label_kbps().cmp(&a.label_kbps()),
        _ => Ordering::Equal,
    })
}

fn quality_label(raw: &RawTrack, height: Option<u32>, bitrate_kbps: Option<f32>) -> String {
    if let Some(height) = height {
        return format!("{height}p");
    }
    if let Some(rate) = bitrate_kbps {
        return format!("{}kbps", rate as u32);
    }
    raw.format_note
        .as_deref()
        .or(raw.format.as_deref())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

fn present_codec(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|codec| !codec.is_empty() && *codec != "none")
        .map(ToString::to_string)
}

/// Human-readable byte size, e.g. `12.4 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
