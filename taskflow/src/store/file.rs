//! Durable run store backed by one JSON document per run.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{select_history, RunStore};
use crate::core::RunRecord;
use crate::errors::PersistenceError;

const EXTENSION: &str = "json";

/// A run store that writes `<dir>/<run_id>.json`.
///
/// Each write goes to a temporary file in the same directory which is
/// flushed to disk and then renamed over the target, so readers never see a
/// half-written document. The directory is created on first write.
#[derive(Debug, Clone)]
pub struct JsonFileRunStore {
    dir: PathBuf,
}

impl JsonFileRunStore {
    /// Creates a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the storage directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the document path for a run id.
    #[must_use]
    pub fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", file_stem(run_id)))
    }

    async fn read_record(path: &Path) -> Result<RunRecord, PersistenceError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PersistenceError::io(path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Serialization {
            run_id: path.display().to_string(),
            message: e.to_string(),
        })
    }

    async fn read_all(&self) -> Result<Vec<RunRecord>, PersistenceError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::io(&self.dir, e)),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PersistenceError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            records.push(Self::read_record(&path).await?);
        }
        Ok(records)
    }
}

#[async_trait]
impl RunStore for JsonFileRunStore {
    async fn persist(&self, record: &RunRecord) -> Result<(), PersistenceError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PersistenceError::io(&self.dir, e))?;

        let body = serde_json::to_vec_pretty(record).map_err(|e| PersistenceError::Serialization {
            run_id: record.run_id.clone(),
            message: e.to_string(),
        })?;

        let target = self.path_for(&record.run_id);
        let temp = self.dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));

        let written = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(&body).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp, &target).await
        }
        .await;

        if let Err(e) = written {
            // Best effort; the write error is what matters.
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(PersistenceError::io(&target, e));
        }

        // The rename is only durable once the directory entry is on disk.
        sync_dir(&self.dir)
            .await
            .map_err(|e| PersistenceError::io(&self.dir, e))?;

        debug!(run_id = %record.run_id, path = %target.display(), "Persisted run record");
        Ok(())
    }

    async fn history(
        &self,
        pipeline_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RunRecord>, PersistenceError> {
        let records = self.read_all().await?;
        Ok(select_history(records, pipeline_id, limit))
    }

    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>, PersistenceError> {
        let path = self.path_for(run_id);
        match tokio::fs::metadata(&path).await {
            Ok(_) => Self::read_record(&path).await.map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::io(&path, e)),
        }
    }
}

/// Flushes a directory's entries to disk.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

/// Directories cannot be opened as files here; the rename is as durable as
/// the platform makes it.
#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Maps a run id to a file name, percent-encoding anything outside
/// `[A-Za-z0-9_-]` so ids with separators or dots cannot escape the
/// directory or collide.
fn file_stem(run_id: &str) -> String {
    let mut stem = String::with_capacity(run_id.len());
    for byte in run_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            let _ = write!(stem, "%{byte:02X}");
        }
    }
    stem
}
