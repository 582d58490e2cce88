use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: Uuid,
    pub title: String,
    pub filename: String,
    pub format: String,
    pub quality: String,
    pub platform: String,
    pub download_url: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence collaborator for finished downloads.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: MediaRecord) -> Result<()>;

    /// Newest first.
    async fn list(&self) -> Result<Vec<MediaRecord>>;

    async fn get(&self, id: Uuid) -> Result<Option<MediaRecord>>;

    /// Returns the removed record, if it existed.
    async fn delete(&self, id: Uuid) -> Result<Option<MediaRecord>>;

    async fn close(&self) -> Result<()>;
}

struct StoreState {
    records: Vec<MediaRecord>,
    closed: bool,
}

/// Records kept in memory and mirrored to a JSON file on every change.
pub struct JsonRecordStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl JsonRecordStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|error| {
                Error::persistence(format!("No se pudo crear la carpeta de datos: {error}"))
            })?;
        }

        let mut records = load_records(&path).await?;
        sort_newest_first(&mut records);
        info!("Registros cargados: {} desde {:?}", records.len(), path);

        Ok(Self {
            path,
            state: Mutex::new(StoreState {
                records,
                closed: false,
            }),
        })
    }
}

fn sort_newest_first(records: &mut [MediaRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

fn ensure_open(state: &StoreState) -> Result<()> {
    if state.closed {
        Err(Error::persistence("El almacen de registros esta cerrado."))
    } else {
        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonRecordStore {
    async fn insert(&self, record: MediaRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        ensure_open(&state)?;
        state.records.insert(0, record);
        sort_newest_first(&mut state.records);
        persist_records(&self.path, &state.records).await
    }

    async fn list(&self) -> Result<Vec<MediaRecord>> {
        let state = self.state.lock().await;
        ensure_open(&state)?;
        Ok(state.records.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<MediaRecord>> {
        let state = self.state.lock().await;
        ensure_open(&state)?;
        Ok(state.records.iter().find(|record| record.id == id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<Option<MediaRecord>> {
        let mut state = self.state.lock().await;
        ensure_open(&state)?;
        let Some(index) = state.records.iter().position(|record| record.id == id) else {
            return Ok(None);
        };
        let removed = state.records.remove(index);
        persist_records(&self.path, &state.records).await?;
        Ok(Some(removed))
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        persist_records(&self.path, &state.records).await?;
        state.closed = true;
        info!("Almacen de registros cerrado");
        Ok(())
    }
}

async fn load_records(path: &Path) -> Result<Vec<MediaRecord>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) if contents.trim().is_empty() => Ok(Vec::new()),
        Ok(contents) => serde_json::from_str(&contents).map_err(|error| {
            Error::persistence(format!("No se pudo leer el registro local: {error}"))
        }),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(error) => Err(Error::persistence(format!(
            "No se pudo abrir el registro local: {error}"
        ))),
    }
}

async fn persist_records(path: &Path, records: &[MediaRecord]) -> Result<()> {
    let payload = serde_json::to_string_pretty(records).map_err(|error| {
        Error::persistence(format!("No se pudo serializar el registro local: {error}"))
    })?;

    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, payload)
        .await
        .map_err(|error| Error::persistence(format!("No se pudo guardar el registro: {error}")))?;
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|error| Error::persistence(format!("No se pudo guardar el registro: {error}")))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::error::ErrorKind as Kind;

    fn record(title: &str, age_minutes: i64) -> MediaRecord {
        MediaRecord {
            id: Uuid::new_v4(),
            title: title.to_string(),
            filename: format!("{title}.mp4"),
            format: "mp4".to_string(),
            quality: "720p".to_string(),
            platform: "Youtube".to_string(),
            download_url: format!("/downloads/{title}.mp4"),
            created_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    #[tokio::test]
    async fn survives_reopen_and_lists_newest_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data").join("records.json");

        let store = JsonRecordStore::open(&path).await.expect("open");
        store.insert(record("old", 30)).await.expect("insert");
        store.insert(record("new", 1)).await.expect("insert");
        store.close().await.expect("close");

        let reopened = JsonRecordStore::open(&path).await.expect("reopen");
        let titles: Vec<_> = reopened
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|record| record.title)
            .collect();
        assert_eq!(titles, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn delete_returns_removed_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonRecordStore::open(dir.path().join("records.json"))
            .await
            .expect("open");
        let kept = record("kept", 5);
        store.insert(kept.clone()).await.expect("insert");

        assert_eq!(store.delete(Uuid::new_v4()).await.expect("delete"), None);
        assert_eq!(
            store.delete(kept.id).await.expect("delete").map(|r| r.id),
            Some(kept.id)
        );
        assert!(store.get(kept.id).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn closed_store_rejects_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonRecordStore::open(dir.path().join("records.json"))
            .await
            .expect("open");
        store.close().await.expect("close");
        store.close().await.expect("second close is a no-op");

        let error = store.insert(record("late", 0)).await.expect_err("closed");
        assert_eq!(error.kind(), Kind::PersistenceFailed);
    }

    #[tokio::test]
    async fn corrupt_file_fails_to_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("records.json");
        tokio::fs::write(&path, "{not json").await.expect("write");

        let error = JsonRecordStore::open(&path).await.err().expect("corrupt");
        assert_eq!(error.kind(), Kind::PersistenceFailed);
    }
}
