//! Core domain for the task digest service.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type, settings schema, and error type used throughout the workspace, plus
//! the two pure pipeline stages: task filtering and prompt composition.
//! Infrastructure crates implement the traits defined here; they never add
//! domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype domain identifiers (`ProjectId`, `TaskId`, etc.) |
//! | [`types`] | Shared value types (`Task`, `SyncHistory`, `ScheduleToken`, etc.) |
//! | [`settings`] | Configuration schema and key-value access |
//! | [`filter`] | Status / assignee / keyword task filters |
//! | [`prompt`] | Prompt composition and assignee resolution |
//! | [`ports`] | Traits implemented by infrastructure crates |
//! | [`errors`] | Error types |

pub mod errors;
pub mod filter;
pub mod identifiers;
pub mod ports;
pub mod prompt;
pub mod settings;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{SettingsError, StoreError, SyncError, TriggerError};
pub use filter::{FilterStage, TaskFilter};
pub use identifiers::{ProjectId, SyncRunId, TaskId, TriggerName, UserId, SYNC_TRIGGER};
pub use ports::{
    LockGuard, Notifier, SettingsStore, StateChange, Summarizer, SyncLock, SyncStateStore,
    TaskSource, TriggerHost,
};
pub use prompt::{PromptComposer, UserDirectory, NO_TASKS_PROMPT, PROMPT_PREAMBLE, UNASSIGNED};
pub use settings::{Credentials, ProjectDraft, Settings, SCHEDULE_OPTIONS, SETTING_KEYS};
pub use types::{
    IntervalSchedules, IntervalSpec, ProjectConfig, ScheduleToken, SyncHistory, SyncResult,
    SyncState, SyncStatus, Task, Timestamp, TriggerRecord, FIFTEEN_MINUTES, HISTORY_LIMIT,
    THIRTY_MINUTES,
};
