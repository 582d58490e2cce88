use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::selection::RequestSpec;

const FALLBACK_TITLE: &str = "video";
const MAX_TITLE_CHARS: usize = 140;
const MAX_FILENAME_BYTES: usize = 255;
const INCOMING_SUFFIX: &str = "incoming";
const ILLEGAL_FILENAME_CHARS: [char; 9] = ['\\', '/', ':', '"', '*', '?', '<', '>', '|'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Accept,
    AudioExtract,
    Convert,
}

/// Decides what it takes to turn an artifact of `artifact_extension` into
/// the requested container.
pub fn plan(artifact_extension: &str, request: &RequestSpec) -> ReconcileAction {
    if artifact_extension.eq_ignore_ascii_case(&request.extension) {
        ReconcileAction::Accept
    } else if request.is_audio_only() {
        ReconcileAction::AudioExtract
    } else {
        ReconcileAction::Convert
    }
}

pub fn sanitize_title(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|character| {
            if ILLEGAL_FILENAME_CHARS.contains(&character) || character.is_control() {
                '_'
            } else {
                character
            }
        })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_TITLE_CHARS).collect();
    let trimmed = truncated.trim().trim_start_matches('.').trim_start();

    if trimmed.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Final name for `title`, kept within the filesystem's per-name byte limit
/// including the temporary suffix used by cross-device placement.
pub fn final_filename(title: &str, extension: &str) -> String {
    let budget = MAX_FILENAME_BYTES
        .saturating_sub(extension.len() + 1)
        .saturating_sub(INCOMING_SUFFIX.len() + 1);
    let sanitized = sanitize_title(title);
    let stem = truncate_to_bytes(&sanitized, budget).trim_end();
    let stem = if stem.is_empty() { FALLBACK_TITLE } else { stem };
    format!("{stem}.{extension}")
}

fn truncate_to_bytes(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Fails unless `path` is a regular file of at least `min_plausible_bytes`.
pub async fn verify_plausible(path: &Path, min_plausible_bytes: u64) -> Result<u64> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            return Err(Error::conversion(format!(
                "No se encontro el archivo convertido {}.",
                path.display()
            )));
        }
        Err(error) => return Err(Error::io("leer archivo convertido", path, error)),
    };

    if !metadata.is_file() || metadata.len() < min_plausible_bytes {
        return Err(Error::conversion(format!(
            "El archivo convertido es invalido ({} bytes).",
            metadata.len()
        )));
    }

    Ok(metadata.len())
}

/// Moves `source` over `destination`, replacing whatever was there.
pub async fn place_final(source: &Path, destination: &Path) -> Result<PathBuf> {
    match tokio::fs::rename(source, destination).await {
        Ok(()) => Ok(destination.to_path_buf()),
        Err(error) if error.kind() == ErrorKind::CrossesDevices => {
            let sibling = destination.with_extension(format!(
                "{}.{INCOMING_SUFFIX}",
                destination
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .unwrap_or_default()
            ));
            tokio::fs::copy(source, &sibling)
                .await
                .map_err(|error| Error::io("copiar archivo final", &sibling, error))?;
            tokio::fs::rename(&sibling, destination)
                .await
                .map_err(|error| Error::io("mover archivo final", destination, error))?;
            Ok(destination.to_path_buf())
        }
        Err(error) => Err(Error::io("mover archivo final", destination, error)),
    }
}
