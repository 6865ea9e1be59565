//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! a [`TaskId`] with a [`UserId`] even though both are `u64` under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty
            /// or whitespace only.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                let trimmed = v.trim();
                if trimmed.is_empty() {
                    None
                } else if trimmed.len() == v.len() {
                    Some(Self(v))
                } else {
                    Some(Self(trimmed.to_string()))
                }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for u64-wrapped newtypes (tracker-assigned integers).
// Generates: struct (Copy), new(), as_u64(), Display.
// ---------------------------------------------------------------------------
macro_rules! u64_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new identifier from a raw integer.
            pub fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the underlying integer value.
            pub fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: tracker-integer-backed
// ---------------------------------------------------------------------------

u64_id! {
    /// Identifies a task in the remote issue tracker.
    TaskId
}

u64_id! {
    /// Identifies a tracker user that tasks can be assigned to.
    ///
    /// Zero is never a valid user; filters treat it as "no assignee filter".
    UserId
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single scheduler firing.
///
/// Generated fresh every time the sync trigger fires; recorded on the run span
/// so all activity from a single firing can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed (configuration names)
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies a tracker project by its external id.
    ///
    /// Used both as the key of the configured project map and as the key of
    /// the stored result history.
    ProjectId
}

string_id! {
    /// Names a trigger registered with the host scheduler primitive.
    TriggerName
}

/// Name under which the recurring sync trigger is registered.
pub const SYNC_TRIGGER: &str = "taskdigest_sync";

impl TriggerName {
    /// The name of the recurring sync trigger.
    pub fn sync() -> Self {
        Self(SYNC_TRIGGER.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_id_rejects_blank_values() {
        assert!(ProjectId::new("").is_none());
        assert!(ProjectId::new("   ").is_none());
    }

    #[test]
    fn test_project_id_trims_surrounding_whitespace() {
        let id = ProjectId::new("  alpha ").expect("non-empty id");
        assert_eq!(id.as_str(), "alpha");
        assert_eq!(id.to_string(), "alpha");
    }

    #[test]
    fn test_project_id_serialises_as_plain_string_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(ProjectId::new("p1").expect("id"), 1);
        let json = serde_json::to_string(&map).expect("serialise");
        assert_eq!(json, r#"{"p1":1}"#);
    }

    #[test]
    fn test_user_id_round_trips_raw_integer() {
        let id: UserId = serde_json::from_str("42").expect("deserialise");
        assert_eq!(id.as_u64(), 42);
    }

    #[test]
    fn test_sync_trigger_name_is_valid() {
        assert_eq!(TriggerName::new(SYNC_TRIGGER), Some(TriggerName::sync()));
    }

    #[test]
    fn test_sync_run_ids_are_unique() {
        assert_ne!(SyncRunId::new_random(), SyncRunId::new_random());
    }
}
