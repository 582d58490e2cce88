use std::io::ErrorKind;
use std::path::Path;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::reconcile::ReconcileAction;
use crate::tools::{TranscodeJob, TranscodeMode, Transcoder};

/// Whether the audio inside `source_extension` can be copied as-is into
/// `target_extension` without re-encoding.
pub fn audio_copy_compatible(source_extension: &str, target_extension: &str) -> bool {
    let source = source_extension.to_ascii_lowercase();
    let target = target_extension.to_ascii_lowercase();
    match target.as_str() {
        "m4a" | "aac" => matches!(source.as_str(), "m4a" | "mp4" | "aac" | "m4b"),
        "opus" | "ogg" => matches!(source.as_str(), "webm" | "opus" | "ogg" | "mka"),
        "mp3" => source == "mp3",
        _ => false,
    }
}

/// Attempts, in order, for a reconcile action.
pub fn attempts(
    action: ReconcileAction,
    source_extension: &str,
    target_extension: &str,
) -> Vec<TranscodeMode> {
    match action {
        ReconcileAction::Accept => Vec::new(),
        ReconcileAction::AudioExtract => {
            if audio_copy_compatible(source_extension, target_extension) {
                vec![TranscodeMode::AudioCopy, TranscodeMode::AudioEncode]
            } else {
                vec![TranscodeMode::AudioEncode]
            }
        }
        ReconcileAction::Convert => vec![TranscodeMode::StreamCopy, TranscodeMode::Reencode],
    }
}

/// Runs the copy-first, encode-second ladder until one attempt succeeds.
pub async fn run(
    transcoder: &dyn Transcoder,
    action: ReconcileAction,
    input: &Path,
    output: &Path,
    target_extension: &str,
) -> Result<()> {
    let source_extension = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    let modes = attempts(action, source_extension, target_extension);
    let mut diagnostics = Vec::new();

    for mode in modes {
        let job = TranscodeJob {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            target_extension: target_extension.to_string(),
            mode,
        };

        match transcoder.transcode(&job).await {
            Ok(()) => {
                info!("{} completo {:?} -> {}", transcoder.name(), mode, output.display());
                return Ok(());
            }
            Err(error @ Error::ToolUnavailable { .. }) => return Err(error),
            Err(error) => {
                warn!("{} fallo en modo {:?}: {error}", transcoder.name(), mode);
                diagnostics.push(format!("{mode:?}: {error}"));
                discard_partial(output).await;
            }
        }
    }

    Err(Error::conversion(if diagnostics.is_empty() {
        "No hay conversion disponible para este formato.".to_string()
    } else {
        format!("No se pudo convertir el archivo.\n{}", diagnostics.join("\n"))
    }))
}

async fn discard_partial(output: &Path) {
    if let Err(error) = tokio::fs::remove_file(output).await
        && error.kind() != ErrorKind::NotFound
    {
        warn!("No se pudo eliminar salida parcial {:?}: {error}", output);
    }
}
