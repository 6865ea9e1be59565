//! In-memory store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    LockGuard, Settings, SettingsStore, StateChange, StoreError, SyncLock, SyncState,
    SyncStateStore,
};
use tokio::sync::Mutex;

use crate::StoreBlob;

const LOCATION: &str = "memory";

/// Keeps the document in process memory.
///
/// [`MemoryStore::set_unavailable`] makes every subsequent call fail with
/// [`StoreError::Io`], for exercising store-failure paths. The run lock is
/// a flag shared by every holder of this store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blob: Mutex<StoreBlob>,
    unavailable: AtomicBool,
    run_lock: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-loaded with `settings`.
    pub fn with_settings(settings: Settings) -> Self {
        Self {
            blob: Mutex::new(StoreBlob {
                settings: Some(settings),
                sync_state: SyncState::default(),
            }),
            ..Self::default()
        }
    }

    /// Toggles simulated backend failure.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// A copy of the current document.
    pub async fn snapshot(&self) -> StoreBlob {
        self.blob.lock().await.clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                location: LOCATION.to_string(),
                message: "store marked unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load(&self) -> Result<Settings, StoreError> {
        self.check()?;
        Ok(self.blob.lock().await.settings_or_default())
    }

    async fn save(&self, settings: &Settings) -> Result<(), StoreError> {
        self.check()?;
        self.blob.lock().await.settings = Some(settings.clone());
        Ok(())
    }

    async fn delete(&self) -> Result<(), StoreError> {
        self.check()?;
        self.blob.lock().await.settings = None;
        Ok(())
    }
}

#[async_trait]
impl SyncStateStore for MemoryStore {
    async fn load_state(&self) -> Result<SyncState, StoreError> {
        self.check()?;
        Ok(self.blob.lock().await.sync_state.clone())
    }

    async fn save_state(&self, state: &SyncState) -> Result<(), StoreError> {
        self.check()?;
        self.blob.lock().await.sync_state = state.clone();
        Ok(())
    }

    async fn update_state(&self, change: StateChange) -> Result<SyncState, StoreError> {
        self.check()?;
        let mut blob = self.blob.lock().await;
        change(&mut blob.sync_state);
        Ok(blob.sync_state.clone())
    }

    async fn clear_state(&self) -> Result<(), StoreError> {
        self.check()?;
        self.blob.lock().await.sync_state = SyncState::default();
        Ok(())
    }
}

/// Clears the run-lock flag on drop.
#[derive(Debug)]
struct HeldFlag(Arc<AtomicBool>);

impl Drop for HeldFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl SyncLock for MemoryStore {
    async fn try_acquire(&self) -> Result<Option<LockGuard>, StoreError> {
        self.check()?;
        if self.run_lock.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(LockGuard::new(HeldFlag(Arc::clone(&self.run_lock)))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_store_rejects_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        assert!(store.load().await.is_err());
        assert!(store.save_state(&SyncState::default()).await.is_err());

        store.set_unavailable(false);
        assert!(store.load().await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_restores_defaults() {
        let mut settings = Settings::default();
        settings.max_tasks_per_sync = 7;
        let store = MemoryStore::with_settings(settings);

        store.delete().await.expect("delete");

        assert_eq!(store.load().await.expect("load"), Settings::default());
        assert!(store.snapshot().await.settings.is_none());
    }

    #[tokio::test]
    async fn test_run_lock_is_released_on_drop() {
        let store = MemoryStore::new();

        let held = store.try_acquire().await.expect("lock").expect("free");
        assert!(store.try_acquire().await.expect("lock").is_none());

        drop(held);
        assert!(store.try_acquire().await.expect("lock").is_some());
    }

    #[tokio::test]
    async fn test_update_state_returns_the_changed_state() {
        let store = MemoryStore::new();
        let at = pipeline::Timestamp::now();

        let updated = store
            .update_state(Box::new(move |state: &mut SyncState| {
                state.last_sync = Some(at);
            }))
            .await
            .expect("update");

        assert_eq!(updated.last_sync, Some(at));
        assert_eq!(store.load_state().await.expect("state"), updated);
    }
}
