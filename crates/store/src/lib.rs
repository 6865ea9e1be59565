//! Persistence adapter for settings and sync results.
//!
//! Implements [`pipeline::SettingsStore`] and [`pipeline::SyncStateStore`]
//! over a single JSON document, plus the [`pipeline::SyncLock`] that keeps
//! two syncs from writing results at once:
//!
//! ```json
//! {
//!   "settings":   { "bugherd_api_key": "...", "sync_schedule": "daily", ... },
//!   "sync_state": {
//!     "results": { "<project>": [ ... ] },
//!     "last_sync": "...",
//!     "trigger": { "schedule": "daily", "registered_at": "...", "next_run": "..." }
//!   }
//! }
//! ```
//!
//! Both halves live in one document so that an export of the file is a
//! complete backup. Each port method reads the whole document, changes its
//! own half, and writes the whole document back.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** File-system access, atomic replacement and encoding
//! live here. The [`pipeline`] crate sees only the two store traits.
//!
//! ## Backends
//!
//! | Type | Use |
//! |------|-----|
//! | [`JsonFileStore`] | Production: one file on disk |
//! | [`MemoryStore`] | Tests and dry runs: nothing touches disk |

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use pipeline::{Settings, SyncState};
use serde::{Deserialize, Serialize};

/// The persisted document.
///
/// `settings` is `None` until the first save (and again after a delete), so
/// that loads can tell "never configured" apart from "configured with
/// defaults".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreBlob {
    /// Stored configuration.
    #[serde(default)]
    pub settings: Option<Settings>,

    /// Stored scheduler results.
    #[serde(default)]
    pub sync_state: SyncState,
}

impl StoreBlob {
    /// Settings with defaults substituted for a missing document.
    pub fn settings_or_default(&self) -> Settings {
        self.settings.clone().unwrap_or_default()
    }
}
