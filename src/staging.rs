use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Suffixes the extraction tool leaves behind while a download is in flight.
const IN_PROGRESS_SUFFIXES: [&str; 3] = ["part", "ytdl", "temp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub extension: String,
}

/// Unique per request and independent of the remote title.
pub fn working_basename() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("dl-{millis}-{}", Uuid::new_v4().simple())
}

fn belongs_to(name: &str, basename: &str) -> bool {
    name.strip_prefix(basename)
        .is_some_and(|rest| rest.starts_with('.'))
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Picks the largest plausible file produced for `basename`.
pub async fn find_artifact(
    staging_dir: &Path,
    basename: &str,
    min_plausible_bytes: u64,
) -> Result<Option<AcquiredArtifact>> {
    let mut entries = tokio::fs::read_dir(staging_dir)
        .await
        .map_err(|error| Error::io("abrir carpeta temporal", staging_dir, error))?;

    let mut best: Option<AcquiredArtifact> = None;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|error| Error::io("leer archivos temporales", staging_dir, error))?
    {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !belongs_to(name, basename) {
            continue;
        }

        let path = entry.path();
        let extension = extension_of(&path);
        if extension.is_empty() || IN_PROGRESS_SUFFIXES.contains(&extension.as_str()) {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(error) => {
                warn!("No se pudo leer metadata de {:?}: {error}", path);
                continue;
            }
        };

        let size_bytes = metadata.len();
        if size_bytes < min_plausible_bytes {
            debug!("Descartando {:?}: {size_bytes} bytes", path);
            continue;
        }

        if best
            .as_ref()
            .is_none_or(|current| size_bytes > current.size_bytes)
        {
            best = Some(AcquiredArtifact {
                path,
                size_bytes,
                extension,
            });
        }
    }

    Ok(best)
}

/// Removes every staging file that shares `basename`. Returns how many went away.
pub async fn cleanup_basename(staging_dir: &Path, basename: &str) -> usize {
    let mut entries = match tokio::fs::read_dir(staging_dir).await {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() != ErrorKind::NotFound {
                warn!("No se pudo abrir carpeta temporal para limpieza: {error}");
            }
            return 0;
        }
    };

    let mut removed = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(error) => {
                warn!("No se pudo iterar carpeta temporal para limpieza: {error}");
                break;
            }
        };

        let belongs = entry
            .file_name()
            .to_str()
            .is_some_and(|name| belongs_to(name, basename));
        if !belongs {
            continue;
        }

        let path = entry.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => warn!("No se pudo eliminar archivo temporal {:?}: {error}", path),
        }
    }

    removed
}

/// Purges staging leftovers older than `older_than`, e.g. from a crash.
pub async fn cleanup_stale(staging_dir: &Path, older_than: Duration) {
    if older_than.is_zero() {
        return;
    }

    let mut entries = match tokio::fs::read_dir(staging_dir).await {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() != ErrorKind::NotFound {
                warn!("No se pudo abrir carpeta temporal para limpieza: {error}");
            }
            return;
        }
    };

    let now = SystemTime::now();

    loop {
        let maybe_entry = match entries.next_entry().await {
            Ok(value) => value,
            Err(error) => {
                warn!("No se pudo iterar carpeta temporal para limpieza: {error}");
                break;
            }
        };

        let Some(entry) = maybe_entry else {
            break;
        };

        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!("No se pudo leer metadata de {:?}: {error}", path);
                continue;
            }
        };

        let modified_at = match metadata.modified() {
            Ok(value) => value,
            Err(error) => {
                warn!(
                    "No se pudo leer fecha de modificacion de {:?}: {error}",
                    path
                );
                continue;
            }
        };

        let age = now.duration_since(modified_at).unwrap_or_default();
        if age < older_than {
            continue;
        }

        let removal = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        if let Err(error) = removal
            && error.kind() != ErrorKind::NotFound
        {
            warn!("No se pudo eliminar temporal {:?}: {error}", path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write(dir: &Path, name: &str, bytes: usize) -> PathBuf {
        let path = dir.join(name);
        tokio::fs::write(&path, vec![0u8; bytes]).await.expect("write");
        path
    }

    #[test]
    fn basenames_are_unique() {
        let first = working_basename();
        let second = working_basename();
        assert_ne!(first, second);
        assert!(first.starts_with("dl-"));
    }

    #[test]
    fn membership_requires_a_dot_after_the_basename() {
        assert!(belongs_to("dl-1-a.mp4", "dl-1-a"));
        assert!(belongs_to("dl-1-a.f137.mp4", "dl-1-a"));
        assert!(!belongs_to("dl-1-ab.mp4", "dl-1-a"));
        assert!(!belongs_to("other.mp4", "dl-1-a"));
    }

    #[tokio::test]
    async fn picks_largest_plausible_candidate() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "dl-7.f137.mp4", 4_000).await;
        write(dir.path(), "dl-7.webm", 9_000).await;
        write(dir.path(), "dl-7.webm.part", 50_000).await;
        write(dir.path(), "dl-8.mkv", 90_000).await;

        let artifact = find_artifact(dir.path(), "dl-7", 1024)
            .await
            .expect("scan")
            .expect("artifact");
        assert_eq!(artifact.extension, "webm");
        assert_eq!(artifact.size_bytes, 9_000);
    }

    #[tokio::test]
    async fn ignores_implausibly_small_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "dl-9.mp4", 100).await;

        let artifact = find_artifact(dir.path(), "dl-9", 1024).await.expect("scan");
        assert!(artifact.is_none());
    }

    #[tokio::test]
    async fn cleanup_only_touches_matching_basename() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "dl-1.mp4", 10).await;
        write(dir.path(), "dl-1.converted.mp3", 10).await;
        let other = write(dir.path(), "dl-2.mp4", 10).await;

        assert_eq!(cleanup_basename(dir.path(), "dl-1").await, 2);
        assert!(other.exists());
        assert_eq!(cleanup_basename(dir.path(), "dl-1").await, 0);
    }

    #[tokio::test]
    async fn stale_cleanup_keeps_fresh_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fresh = write(dir.path(), "dl-3.mp4", 10).await;

        cleanup_stale(dir.path(), Duration::from_secs(3600)).await;
        assert!(fresh.exists());

        cleanup_stale(dir.path(), Duration::ZERO).await;
        assert!(fresh.exists());
    }
}
