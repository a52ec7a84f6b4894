use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use carousel_core_types::Cursor;

use crate::errors::{CheckpointErrKind, CheckpointError};
use crate::model::CheckpointRecord;
use crate::persist;

pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Single-writer store for the last confirmed cursor of one job.
///
/// `save` returns only after the record is durable. `load` returns the most
/// recent successful save; a failed save leaves the previous record intact.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, cursor: &Cursor) -> CheckpointResult<()>;
    async fn load(&self) -> CheckpointResult<Option<Cursor>>;
    async fn record(&self) -> CheckpointResult<Option<CheckpointRecord>>;
    async fn clear(&self) -> CheckpointResult<bool>;
}

pub(crate) fn validate(cursor: &Cursor) -> CheckpointResult<()> {
    if cursor.address().trim().is_empty() {
        return Err(CheckpointErrKind::InvalidCursor(format!(
            "cursor for item {} has no address",
            cursor.index_hint()
        ))
        .into());
    }
    if !cursor.has_fingerprint() {
        warn!(
            item_index = cursor.index_hint(),
            "saving address-only checkpoint; resume will rely on the address alone"
        );
    }
    Ok(())
}

/// JSON file per job key, written via temp file + fsync + rename.
pub struct FileCheckpointStore {
    path: PathBuf,
    run_id: Option<String>,
    write_lock: Mutex<()>,
    cache: RwLock<Option<CheckpointRecord>>,
}

impl FileCheckpointStore {
    pub fn open(dir: impl AsRef<Path>, job_key: &str) -> CheckpointResult<Arc<Self>> {
        let path = persist::record_path(dir.as_ref(), job_key)?;
        Ok(Arc::new(Self {
            path,
            run_id: None,
            write_lock: Mutex::new(()),
            cache: RwLock::new(None),
        }))
    }

    /// Tag every saved record with the run that wrote it.
    pub fn open_for_run(
        dir: impl AsRef<Path>,
        job_key: &str,
        run_id: impl Into<String>,
    ) -> CheckpointResult<Arc<Self>> {
        let path = persist::record_path(dir.as_ref(), job_key)?;
        Ok(Arc::new(Self {
            path,
            run_id: Some(run_id.into()),
            write_lock: Mutex::new(()),
            cache: RwLock::new(None),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, cursor: &Cursor) -> CheckpointResult<()> {
        validate(cursor)?;
        let mut record = CheckpointRecord::from_cursor(cursor);
        if let Some(run_id) = &self.run_id {
            record = record.with_run_id(run_id.clone());
        }

        let _guard = self.write_lock.lock();
        persist::store(&self.path, &record)?;
        info!(
            item_index = record.index,
            address = %record.address,
            fingerprint = %record.fingerprint,
            path = %self.path.display(),
            "checkpoint saved"
        );
        *self.cache.write() = Some(record);
        Ok(())
    }

    async fn load(&self) -> CheckpointResult<Option<Cursor>> {
        Ok(self.record().await?.map(|record| record.to_cursor()))
    }

    async fn record(&self) -> CheckpointResult<Option<CheckpointRecord>> {
        if let Some(cached) = self.cache.read().clone() {
            return Ok(Some(cached));
        }
        let loaded = persist::load(&self.path)?;
        match &loaded {
            Some(record) => debug!(item_index = record.index, "checkpoint loaded from disk"),
            None => debug!(path = %self.path.display(), "no checkpoint on disk"),
        }
        *self.cache.write() = loaded.clone();
        Ok(loaded)
    }

    async fn clear(&self) -> CheckpointResult<bool> {
        let _guard = self.write_lock.lock();
        let removed = persist::remove(&self.path)?;
        *self.cache.write() = None;
        if removed {
            info!(path = %self.path.display(), "checkpoint cleared");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carousel_core_types::Fingerprint;

    fn cursor(index: usize) -> Cursor {
        Cursor::new(
            format!("https://carousel.local/jobs/abc?index={}", index % 4),
            index,
            Fingerprint::new(format!("cdn/abc/0_{}.png", index % 4)),
        )
    }

    #[tokio::test]
    async fn empty_store_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path(), "job").unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn saved_cursor_survives_a_new_process() {
        let dir = tempfile::tempdir().unwrap();
        let first = FileCheckpointStore::open(dir.path(), "job").unwrap();
        first.save(&cursor(9)).await.unwrap();

        let second = FileCheckpointStore::open(dir.path(), "job").unwrap();
        assert_eq!(second.load().await.unwrap(), Some(cursor(9)));
    }

    #[tokio::test]
    async fn saving_the_same_cursor_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path(), "job").unwrap();
        store.save(&cursor(9)).await.unwrap();
        store.save(&cursor(9)).await.unwrap();

        let reopened = FileCheckpointStore::open(dir.path(), "job").unwrap();
        assert_eq!(reopened.load().await.unwrap(), Some(cursor(9)));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(leftovers, vec!["job.checkpoint.json".to_string()]);
    }

    #[tokio::test]
    async fn later_save_replaces_earlier() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::open_for_run(dir.path(), "job", "run-1").unwrap();
        store.save(&cursor(9)).await.unwrap();
        store.save(&cursor(11)).await.unwrap();

        let record = store.record().await.unwrap().unwrap();
        assert_eq!(record.index, 11);
        assert_eq!(record.run_id.as_deref(), Some("run-1"));
    }

    #[tokio::test]
    async fn rejected_cursor_keeps_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path(), "job").unwrap();
        store.save(&cursor(4)).await.unwrap();

        let bad = Cursor::new("  ", 5, Fingerprint::new("x"));
        assert!(store.save(&bad).await.is_err());
        assert_eq!(store.load().await.unwrap(), Some(cursor(4)));
    }

    #[tokio::test]
    async fn address_only_cursor_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path(), "job").unwrap();
        let address_only = Cursor::new(cursor(6).address(), 6, Fingerprint::empty());
        store.save(&address_only).await.unwrap();

        let reopened = FileCheckpointStore::open(dir.path(), "job").unwrap();
        let loaded = reopened.load().await.unwrap().unwrap();
        assert_eq!(loaded.index_hint(), 6);
        assert!(!loaded.has_fingerprint());
    }

    #[tokio::test]
    async fn clear_removes_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path(), "job").unwrap();
        store.save(&cursor(1)).await.unwrap();
        assert!(store.clear().await.unwrap());
        assert!(store.load().await.unwrap().is_none());
        assert!(!store.clear().await.unwrap());
    }
}
