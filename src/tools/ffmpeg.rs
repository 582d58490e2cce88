use std::time::Duration;

use async_trait::async_trait;

use super::process::{self, RunFailure};
use super::{TranscodeJob, TranscodeMode, Transcoder};
use crate::error::{Error, Result};

pub struct Ffmpeg {
    binary: String,
    timeout: Duration,
    preset: String,
}

impl Ffmpeg {
    pub fn new(binary: impl Into<String>, timeout: Duration, preset: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            preset: preset.into(),
        }
    }
}

#[async_trait]
impl Transcoder for Ffmpeg {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn transcode(&self, job: &TranscodeJob) -> Result<()> {
        let args = build_args(job, &self.preset);
        process::run(&self.binary, &args, self.timeout)
            .await
            .map(|_| ())
            .map_err(|failure| match failure {
                RunFailure::NotFound => Error::ToolUnavailable {
                    tool: self.binary.clone(),
                },
                RunFailure::TimedOut(limit) => Error::conversion(format!(
                    "La conversion excedio el tiempo limite de {}s.",
                    limit.as_secs()
                )),
                RunFailure::Spawn(error) => {
                    Error::conversion(format!("No se pudo ejecutar {}: {error}", self.binary))
                }
                RunFailure::Exited { code, stderr } => Error::conversion(format!(
                    "{}\n{}",
                    exit_summary(code),
                    process::diagnostic_tail(&stderr)
                )),
            })
    }
}

/// Maps ffmpeg exit codes to a short summary; the stderr tail follows it.
fn exit_summary(code: Option<i32>) -> String {
    match code {
        Some(1) => "FFmpeg fallo.".to_string(),
        Some(69) => "FFmpeg supero el limite de velocidad de codificacion.".to_string(),
        Some(123) | Some(255) => "FFmpeg fue detenido.".to_string(),
        Some(code) => format!("FFmpeg fallo (codigo de salida {code})."),
        None => "FFmpeg termino por una senal.".to_string(),
    }
}

fn build_args(job: &TranscodeJob, preset: &str) -> Vec<String> {
    let extension = job.target_extension.to_ascii_lowercase();
    let mut args: Vec<String> = [
        "-hide_banner",
        "-nostdin",
        "-loglevel",
        "error",
        "-y",
        "-i",
    ]
    .iter()
    .map(ToString::to_string)
    .collect();
    args.push(job.input.to_string_lossy().into_owned());

    match job.mode {
        TranscodeMode::AudioCopy => {
            push_all(&mut args, &["-vn", "-map", "0:a:0", "-c:a", "copy"]);
        }
        TranscodeMode::AudioEncode => {
            push_all(&mut args, &["-vn", "-map", "0:a:0"]);
            push_all(&mut args, audio_encoder_args(&extension));
        }
        TranscodeMode::StreamCopy => {
            push_all(&mut args, &["-map", "0:v?", "-map", "0:a?", "-c", "copy"]);
        }
        TranscodeMode::Reencode => {
            push_all(&mut args, &["-map", "0:v?", "-map", "0:a?"]);
            if extension == "webm" {
                push_all(
                    &mut args,
                    &[
                        "-c:v",
                        "libvpx-vp9",
                        "-b:v",
                        "0",
                        "-crf",
                        "32",
                        "-c:a",
                        "libopus",
                        "-b:a",
                        "128k",
                    ],
                );
            } else {
                push_all(&mut args, &["-c:v", "libx264", "-preset"]);
                args.push(preset.to_string());
                push_all(
                    &mut args,
                    &["-crf", "23", "-pix_fmt", "yuv420p", "-c:a", "aac", "-b:a", "192k"],
                );
            }
        }
    }

    if matches!(job.mode, TranscodeMode::StreamCopy | TranscodeMode::Reencode)
        && matches!(extension.as_str(), "mp4" | "m4v" | "mov")
    {
        push_all(&mut args, &["-movflags", "+faststart"]);
    }

    args.push(job.output.to_string_lossy().into_owned());
    args
}

fn audio_encoder_args(extension: &str) -> &'static [&'static str] {
    match extension {
        "mp3" => &["-c:a", "libmp3lame", "-q:a", "0"],
        "m4a" | "aac" => &["-c:a", "aac", "-b:a", "192k"],
        "opus" => &["-c:a", "libopus", "-b:a", "160k"],
        "ogg" => &["-c:a", "libvorbis", "-q:a", "6"],
        "wav" => &["-c:a", "pcm_s16le"],
        _ => &[],
    }
}

fn push_all(args: &mut Vec<String>, values: &[&str]) {
    args.extend(values.iter().map(ToString::to_string));
}
