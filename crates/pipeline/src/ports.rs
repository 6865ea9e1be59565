//! Port traits implemented by infrastructure crates.
//!
//! | Trait | Implemented by |
//! |-------|----------------|
//! | [`TaskSource`] | `bugherd` |
//! | [`Summarizer`] | `llm` |
//! | [`SettingsStore`], [`SyncStateStore`], [`SyncLock`] | `store` |
//! | [`TriggerHost`] | `listener` |
//! | [`Notifier`] | `cli` |
//!
//! `TaskSource` and `Summarizer` deliberately return plain values rather than
//! `Result`: transport failures are absorbed and logged inside the adapter,
//! and callers only ever see an empty collection or `None`.

use std::any::Any;

use async_trait::async_trait;

use crate::{
    IntervalSchedules, ProjectId, Settings, StoreError, SyncState, Task, Timestamp, TriggerError,
    TriggerName,
};

/// Fetches every task belonging to a project.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// All tasks for `project`, in tracker order. Empty on any failure.
    async fn fetch_all_tasks(&self, project: &ProjectId) -> Vec<Task>;
}

/// Turns a composed prompt into a summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// The summary text, or `None` when the backend failed.
    async fn summarize(&self, prompt: &str) -> Option<String>;
}

/// Persists [`Settings`].
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Reads the stored settings with defaults merged in.
    async fn load(&self) -> Result<Settings, StoreError>;

    /// Replaces the stored settings.
    async fn save(&self, settings: &Settings) -> Result<(), StoreError>;

    /// Removes the stored settings; the next `load` returns defaults.
    async fn delete(&self) -> Result<(), StoreError>;
}

/// An edit applied by [`SyncStateStore::update_state`].
pub type StateChange = Box<dyn FnOnce(&mut SyncState) + Send>;

/// Persists scheduler results between firings.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Reads the stored state, or an empty state if none exists.
    async fn load_state(&self) -> Result<SyncState, StoreError>;

    /// Replaces the stored state.
    async fn save_state(&self, state: &SyncState) -> Result<(), StoreError>;

    /// Applies `change` to the stored state as one read-modify-write cycle
    /// that no other writer can interleave with, and returns the new state.
    async fn update_state(&self, change: StateChange) -> Result<SyncState, StoreError>;

    /// Removes all stored results and the last-sync timestamp.
    async fn clear_state(&self) -> Result<(), StoreError>;
}

/// Exclusive right to run a sync, shared by every process that uses the
/// same store.
#[async_trait]
pub trait SyncLock: Send + Sync {
    /// Takes the lock, or returns `Ok(None)` while another holder has it.
    async fn try_acquire(&self) -> Result<Option<LockGuard>, StoreError>;
}

/// A held [`SyncLock`]. Dropping the guard releases the lock.
#[must_use]
pub struct LockGuard(Box<dyn Any + Send + Sync>);

impl LockGuard {
    /// Wraps whatever value keeps the lock held until it is dropped.
    pub fn new(held: impl Any + Send + Sync) -> Self {
        Self(Box::new(held))
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LockGuard")
    }
}

/// Fire-and-forget outbound notification.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a message. Delivery failures are the implementation's concern.
    async fn send(&self, to: &str, subject: &str, body: &str);
}

/// Host facility for registering named triggers.
///
/// A host may hold several pending firings under one name (e.g. a periodic
/// registration plus a one-shot manual trigger).
pub trait TriggerHost: Send + Sync {
    /// Registers a recurring trigger firing first at `first_run` and then
    /// every `interval` (a token from [`TriggerHost::intervals`]).
    fn register_periodic(
        &self,
        name: &TriggerName,
        interval: &str,
        first_run: Timestamp,
    ) -> Result<(), TriggerError>;

    /// Registers a single firing at `at`.
    fn register_one_shot(&self, name: &TriggerName, at: Timestamp) -> Result<(), TriggerError>;

    /// Cancels every pending firing registered under `name`.
    fn clear(&self, name: &TriggerName);

    /// The earliest pending firing under `name`, if any.
    fn next_scheduled(&self, name: &TriggerName) -> Option<Timestamp>;

    /// The recurrences this host understands.
    fn intervals(&self) -> IntervalSchedules;
}
