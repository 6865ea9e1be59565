//! Error types for the task digest domain.
//!
//! [`SyncError`] covers conditions that abort a scheduled sync or an
//! on-demand administrative call. Transport failures talking to the tracker
//! or the completion API are *not* represented here: those are absorbed at
//! the client boundary and degrade to empty / fallback results.
//!
//! Port-level errors ([`StoreError`], [`TriggerError`]) are defined here so
//! that trait signatures in [`crate::ports`] can name them; infrastructure
//! crates map their own failures onto these variants.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// Failure reading or writing the persisted settings / result blob.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing medium could not be read or written.
    #[error("Store I/O failed at '{location}': {message}")]
    Io {
        /// Where the store lives (file path, or a backend label).
        location: String,
        /// Underlying error text.
        message: String,
    },

    /// The stored blob could not be encoded or decoded.
    #[error("Stored data is malformed: {message}")]
    Serialization {
        /// Underlying error text.
        message: String,
    },
}

/// Failure registering or clearing a trigger with the host scheduler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// The requested recurrence is not in the host's interval set.
    #[error("Unknown schedule interval '{interval}'")]
    UnknownInterval {
        /// The interval token that was requested.
        interval: String,
    },

    /// The host scheduler is not accepting registrations.
    #[error("Trigger host unavailable: {message}")]
    Unavailable {
        /// Why the host rejected the request.
        message: String,
    },
}

/// Rejected settings access.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// The key is not part of the settings schema.
    #[error("Unknown setting '{key}'")]
    UnknownKey {
        /// The offending key.
        key: String,
    },

    /// The value does not have the shape the key requires.
    #[error("Invalid value for setting '{key}': {message}")]
    InvalidValue {
        /// The key being written.
        key: String,
        /// Why the value was rejected.
        message: String,
    },

    /// A project entry is missing its id or name.
    #[error("Project requires a non-empty id and name")]
    IncompleteProject,

    /// Imported text is not a JSON object.
    #[error("Import must be a JSON object: {message}")]
    MalformedImport {
        /// Parser message.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Sync-level errors
// ---------------------------------------------------------------------------

/// Errors that abort a scheduled sync or an administrative call.
///
/// Inside the scheduler these are caught once at the top of a firing, logged,
/// and converted into a failure notification; they never reach the trigger
/// host.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Settings or result history could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The host scheduler rejected a request.
    #[error(transparent)]
    Trigger(#[from] TriggerError),

    /// A settings mutation was rejected.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Another sync holds the run lock.
    #[error("Another sync is already in progress")]
    InProgress,

    /// The runtime configuration cannot support the requested operation.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },
}
