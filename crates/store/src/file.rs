//! Single-file JSON store.

use std::path::{Path, PathBuf};

use std::fs::TryLockError;

use async_trait::async_trait;
use pipeline::{
    LockGuard, Settings, SettingsStore, StateChange, StoreError, SyncLock, SyncState,
    SyncStateStore,
};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::StoreBlob;

/// Stores settings and results in one JSON file.
///
/// A missing file reads as an empty document. Writes go to a sibling
/// temporary file which is then renamed over the target, so a reader never
/// observes a half-written document. The internal lock serialises
/// read-modify-write cycles from this process.
///
/// Writes also hold an advisory lock on a `<file>.lock` sibling, so
/// read-modify-write cycles from different processes never interleave. The
/// run lock is a second advisory lock, on `<file>.sync.lock`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Creates a store backed by `path`. Nothing is read until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_blob(&self) -> Result<StoreBlob, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Store file absent; using empty document");
                return Ok(StoreBlob::default());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
            message: e.to_string(),
        })
    }

    async fn write_blob(&self, blob: &StoreBlob) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec_pretty(blob).map_err(|e| StoreError::Serialization {
            message: e.to_string(),
        })?;

        self.ensure_parent().await?;

        let staging = self.staging_path();
        tokio::fs::write(&staging, encoded)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| self.io_error(e))
    }

    /// One read-modify-write cycle, exclusive across every process that
    /// shares the file.
    async fn modify<F>(&self, change: F) -> Result<StoreBlob, StoreError>
    where
        F: FnOnce(&mut StoreBlob) + Send,
    {
        let _guard = self.lock.lock().await;
        let _exclusive = self.lock_for_write().await?;
        let mut blob = self.read_blob().await?;
        change(&mut blob);
        self.write_blob(&blob).await?;
        Ok(blob)
    }

    async fn open_lock_file(&self, path: PathBuf) -> Result<std::fs::File, StoreError> {
        self.ensure_parent().await?;
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .await
            .map_err(|e| self.io_error(e))?;
        Ok(file.into_std().await)
    }

    /// Blocks (off the runtime) until the write lock is free. The lock is
    /// held until the returned file is dropped.
    async fn lock_for_write(&self) -> Result<std::fs::File, StoreError> {
        let file = self.open_lock_file(self.write_lock_path()).await?;
        tokio::task::spawn_blocking(move || file.lock().map(|()| file))
            .await
            .map_err(|e| StoreError::Io {
                location: self.path.display().to_string(),
                message: e.to_string(),
            })?
            .map_err(|e| self.io_error(e))
    }

    fn staging_path(&self) -> PathBuf {
        self.sibling("tmp")
    }

    fn write_lock_path(&self) -> PathBuf {
        self.sibling("lock")
    }

    fn run_lock_path(&self) -> PathBuf {
        self.sibling("sync.lock")
    }

    fn sibling(&self, extension: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".");
        name.push(extension);
        self.path.with_file_name(name)
    }

    async fn ensure_parent(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        Ok(())
    }

    fn io_error(&self, error: std::io::Error) -> StoreError {
        StoreError::Io {
            location: self.path.display().to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl SettingsStore for JsonFileStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<Settings, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_blob().await?.settings_or_default())
    }

    async fn save(&self, settings: &Settings) -> Result<(), StoreError> {
        let settings = settings.clone();
        self.modify(move |blob| blob.settings = Some(settings))
            .await
            .map(drop)
    }

    async fn delete(&self) -> Result<(), StoreError> {
        self.modify(|blob| blob.settings = None).await.map(drop)
    }
}

#[async_trait]
impl SyncStateStore for JsonFileStore {
    async fn load_state(&self) -> Result<SyncState, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_blob().await?.sync_state)
    }

    async fn save_state(&self, state: &SyncState) -> Result<(), StoreError> {
        let state = state.clone();
        self.modify(move |blob| blob.sync_state = state)
            .await
            .map(drop)
    }

    async fn update_state(&self, change: StateChange) -> Result<SyncState, StoreError> {
        self.modify(move |blob| change(&mut blob.sync_state))
            .await
            .map(|blob| blob.sync_state)
    }

    async fn clear_state(&self) -> Result<(), StoreError> {
        self.modify(|blob| blob.sync_state = SyncState::default())
            .await
            .map(drop)
    }
}

#[async_trait]
impl SyncLock for JsonFileStore {
    async fn try_acquire(&self) -> Result<Option<LockGuard>, StoreError> {
        let path = self.run_lock_path();
        let file = self.open_lock_file(path.clone()).await?;

        match file.try_lock() {
            Ok(()) => Ok(Some(LockGuard::new(file))),
            Err(TryLockError::WouldBlock) => {
                debug!(path = %path.display(), "Run lock held elsewhere");
                Ok(None)
            }
            Err(TryLockError::Error(e)) => Err(self.io_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{ProjectId, ScheduleToken, SyncResult, Timestamp};

    fn store_in(dir: &tempfile::TempDir) -> JsonFileStore {
        JsonFileStore::new(dir.path().join("nested").join("taskdigest.json"))
    }

    #[tokio::test]
    async fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        assert_eq!(store.load().await.expect("load"), Settings::default());
        assert_eq!(store.load_state().await.expect("state"), SyncState::default());
    }

    #[tokio::test]
    async fn test_settings_and_state_share_one_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        let project = ProjectId::new("p1").expect("id");

        let mut settings = Settings::default();
        settings.sync_schedule = ScheduleToken::Weekly;
        store.save(&settings).await.expect("save settings");

        let mut state = SyncState::default();
        state.record(
            &project,
            SyncResult {
                summary: "done".to_string(),
                timestamp: Timestamp::now(),
            },
        );
        store.save_state(&state).await.expect("save state");

        let reopened = JsonFileStore::new(store.path());
        assert_eq!(reopened.load().await.expect("load").sync_schedule, ScheduleToken::Weekly);
        assert_eq!(reopened.load_state().await.expect("state").results[&project].len(), 1);
        assert!(!dir.path().join("nested").join("taskdigest.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_delete_keeps_results_and_clear_keeps_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        let project = ProjectId::new("p1").expect("id");

        let mut settings = Settings::default();
        settings.debug_mode = true;
        store.save(&settings).await.expect("save");
        let mut state = SyncState::default();
        state.last_sync = Some(Timestamp::now());
        state.record(
            &project,
            SyncResult {
                summary: "s".to_string(),
                timestamp: Timestamp::now(),
            },
        );
        store.save_state(&state).await.expect("save state");

        store.clear_state().await.expect("clear");
        assert!(store.load().await.expect("load").debug_mode);
        assert_eq!(store.load_state().await.expect("state"), SyncState::default());

        store.save_state(&state).await.expect("save state");
        store.delete().await.expect("delete");
        assert!(!store.load().await.expect("load").debug_mode);
        assert!(store.load_state().await.expect("state").last_sync.is_some());
    }

    #[tokio::test]
    async fn test_run_lock_excludes_other_handles_until_released() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = store_in(&dir);
        let second = JsonFileStore::new(first.path());

        let held = first.try_acquire().await.expect("lock").expect("free");
        assert!(second.try_acquire().await.expect("lock").is_none());

        drop(held);
        assert!(second.try_acquire().await.expect("lock").is_some());
        assert!(dir.path().join("nested").join("taskdigest.json.sync.lock").exists());
    }

    #[tokio::test]
    async fn test_updates_from_separate_handles_are_not_lost() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = store_in(&dir);
        let second = JsonFileStore::new(first.path());
        let project = ProjectId::new("p1").expect("id");

        let record = |summary: &str| -> StateChange {
            let project = project.clone();
            let result = SyncResult {
                summary: summary.to_string(),
                timestamp: Timestamp::now(),
            };
            Box::new(move |state: &mut SyncState| state.record(&project, result))
        };
        let (a, b) = tokio::join!(
            first.update_state(record("from first")),
            second.update_state(record("from second"))
        );
        a.expect("first update");
        b.expect("second update");

        let stored = first.load_state().await.expect("state");
        assert_eq!(stored.results[&project].len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("taskdigest.json");
        std::fs::write(&path, b"{ not json").expect("write");

        let store = JsonFileStore::new(&path);

        assert!(matches!(
            store.load().await,
            Err(StoreError::Serialization { .. })
        ));
    }

    #[tokio::test]
    async fn test_partial_settings_document_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("taskdigest.json");
        std::fs::write(&path, br#"{"settings": {"max_tasks_per_sync": 5}}"#).expect("write");

        let settings = JsonFileStore::new(&path).load().await.expect("load");

        assert_eq!(settings.max_tasks_per_sync, 5);
        assert_eq!(settings.sync_schedule, ScheduleToken::Daily);
        assert!(settings.enable_notifications);
    }
}
