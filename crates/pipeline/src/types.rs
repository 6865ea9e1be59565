//! Shared value types for the task digest domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (e.g. a [`SyncHistory`] never holds more
//! than [`HISTORY_LIMIT`] entries) and participate in domain computations.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{ProjectId, TaskId, UserId};

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Returns this timestamp shifted forward by `secs` seconds, saturating
    /// at the representable maximum.
    pub fn plus_secs(self, secs: u64) -> Self {
        let shifted = i64::try_from(secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|delta| self.0.checked_add_signed(delta));
        Self(shifted.unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// Time remaining until this timestamp, or zero if it is in the past.
    pub fn duration_until(self) -> std::time::Duration {
        (self.0 - Utc::now()).to_std().unwrap_or_default()
    }

    /// Formats as `YYYY-MM-DD HH:MM:SS` for human-facing text.
    pub fn to_display_string(self) -> String {
        self.0.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// A unit of tracked work fetched from the remote issue tracker.
///
/// Tasks are immutable once fetched: the pipeline only ever narrows a
/// collection of them into new collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Tracker-assigned task number. `0` when the tracker omitted it.
    #[serde(default)]
    pub id: TaskId,

    /// Free-text description. `None` when the tracker omitted it.
    #[serde(default)]
    pub description: Option<String>,

    /// Tracker-defined status (e.g. `"todo"`, `"in_progress"`, `"done"`).
    #[serde(default)]
    pub status: Option<String>,

    /// Assigned users in tracker order. May be empty. Entries that are not
    /// user numbers are dropped.
    #[serde(default, deserialize_with = "assignee_ids")]
    pub assignee_ids: Vec<UserId>,
}

impl Task {
    /// Creates a task with a description, status and assignees.
    pub fn new(
        id: u64,
        description: impl Into<String>,
        status: impl Into<String>,
        assignee_ids: impl IntoIterator<Item = u64>,
    ) -> Self {
        Self {
            id: TaskId::new(id),
            description: Some(description.into()),
            status: Some(status.into()),
            assignee_ids: assignee_ids.into_iter().map(UserId::new).collect(),
        }
    }

    /// The first assignee, if any. Only the first assignee is ever used for
    /// display purposes.
    pub fn primary_assignee(&self) -> Option<UserId> {
        self.assignee_ids.first().copied()
    }
}

fn assignee_ids<'de, D>(deserializer: D) -> Result<Vec<UserId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .iter()
        .filter_map(|value| match value {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .map(UserId::new)
        .collect())
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

/// A configured tracker project.
///
/// Created and updated through settings management; read-only to the sync
/// pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// External tracker project id. Unique key of the project map.
    pub id: ProjectId,

    /// Human-readable project name.
    pub name: String,

    /// Optional free-text description.
    #[serde(default)]
    pub description: String,

    /// Only active projects are synced by the scheduler.
    #[serde(default = "default_active")]
    pub active: bool,

    /// When the project entry was first written.
    pub created_at: Timestamp,

    /// When the project entry was last written.
    pub updated_at: Timestamp,
}

fn default_active() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Sync results
// ---------------------------------------------------------------------------

/// Maximum number of results retained per project.
pub const HISTORY_LIMIT: usize = 10;

/// One stored summary for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    /// The generated (or fallback) summary text.
    pub summary: String,

    /// When the summary was stored.
    pub timestamp: Timestamp,
}

/// Bounded, insertion-ordered history of [`SyncResult`]s for one project.
///
/// Holds at most [`HISTORY_LIMIT`] entries; pushing onto a full history
/// evicts the oldest entry. The bound is also enforced when deserialising
/// a stored history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<SyncResult>", into = "Vec<SyncResult>")]
pub struct SyncHistory(VecDeque<SyncResult>);

impl SyncHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `result`, evicting the oldest entries beyond the limit.
    pub fn push(&mut self, result: SyncResult) {
        self.0.push_back(result);
        while self.0.len() > HISTORY_LIMIT {
            self.0.pop_front();
        }
    }

    /// Number of stored results.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no result has been stored.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The most recently stored result.
    pub fn latest(&self) -> Option<&SyncResult> {
        self.0.back()
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &SyncResult> {
        self.0.iter()
    }
}

impl From<Vec<SyncResult>> for SyncHistory {
    fn from(results: Vec<SyncResult>) -> Self {
        let mut history = Self::new();
        for result in results {
            history.push(result);
        }
        history
    }
}

impl From<SyncHistory> for Vec<SyncResult> {
    fn from(history: SyncHistory) -> Self {
        history.0.into()
    }
}

/// Everything the scheduler persists between firings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Per-project result history.
    #[serde(default)]
    pub results: BTreeMap<ProjectId, SyncHistory>,

    /// When the last complete scheduled sync finished.
    #[serde(default)]
    pub last_sync: Option<Timestamp>,

    /// The recurring trigger registered by the running scheduler host.
    /// `None` after teardown, or when no host ever registered one.
    #[serde(default)]
    pub trigger: Option<TriggerRecord>,
}

/// Persisted view of the recurring trigger, shared with every process that
/// reads the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRecord {
    /// Schedule the trigger was registered for. `Disabled` records that the
    /// host is running with nothing registered.
    pub schedule: ScheduleToken,

    /// When the registration was made.
    pub registered_at: Timestamp,

    /// Next pending firing, or `None` once the host stopped.
    #[serde(default)]
    pub next_run: Option<Timestamp>,
}

impl SyncState {
    /// Appends `result` to the history of `project`.
    pub fn record(&mut self, project: &ProjectId, result: SyncResult) {
        self.results.entry(project.clone()).or_default().push(result);
    }
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

/// Interval token for the custom fifteen-minute schedule.
pub const FIFTEEN_MINUTES: &str = "fifteen_minutes";

/// Interval token for the custom thirty-minute schedule.
pub const THIRTY_MINUTES: &str = "thirty_minutes";

/// The configured recurrence of the scheduled sync.
///
/// Stored as a plain string token; unknown tokens are preserved as
/// [`ScheduleToken::Custom`] and resolved against the host's interval set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScheduleToken {
    /// No recurring sync.
    Disabled,
    /// Every hour.
    Hourly,
    /// Once a day.
    #[default]
    Daily,
    /// Once a week.
    Weekly,
    /// Any other interval name the host scheduler knows about.
    Custom(String),
}

impl ScheduleToken {
    /// Parses a token. Never fails: unrecognised names become `Custom`.
    pub fn parse(token: &str) -> Self {
        match token.trim() {
            "disabled" => Self::Disabled,
            "hourly" => Self::Hourly,
            "daily" => Self::Daily,
            "weekly" => Self::Weekly,
            other => Self::Custom(other.to_string()),
        }
    }

    /// The token as stored and as passed to the host scheduler.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Disabled => "disabled",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Custom(name) => name,
        }
    }

    /// Returns `true` for [`ScheduleToken::Disabled`].
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// Display label for the built-in tokens; `None` for custom ones.
    pub fn builtin_label(&self) -> Option<&'static str> {
        match self {
            Self::Disabled => Some("Disabled"),
            Self::Hourly => Some("Every Hour"),
            Self::Daily => Some("Daily"),
            Self::Weekly => Some("Weekly"),
            Self::Custom(_) => None,
        }
    }

    /// Human label, consulting `intervals` for custom tokens.
    pub fn label(&self, intervals: &IntervalSchedules) -> String {
        match self.builtin_label() {
            Some(label) => label.to_string(),
            None => intervals
                .get(self.as_str())
                .map(|spec| spec.display.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
        }
    }
}

impl From<String> for ScheduleToken {
    fn from(token: String) -> Self {
        Self::parse(&token)
    }
}

impl From<ScheduleToken> for String {
    fn from(token: ScheduleToken) -> Self {
        token.as_str().to_string()
    }
}

impl std::fmt::Display for ScheduleToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named recurrence known to the host scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalSpec {
    /// Seconds between firings.
    pub interval_secs: u64,
    /// Human-readable name.
    pub display: String,
}

impl IntervalSpec {
    /// Creates an interval spec.
    pub fn new(interval_secs: u64, display: impl Into<String>) -> Self {
        Self {
            interval_secs,
            display: display.into(),
        }
    }
}

/// The enumerable set of recurrences a host scheduler exposes, keyed by
/// interval token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalSchedules(BTreeMap<String, IntervalSpec>);

impl IntervalSchedules {
    /// The recurrences every host provides out of the box.
    pub fn builtin() -> Self {
        let mut schedules = Self::default();
        schedules.insert_if_absent("hourly", IntervalSpec::new(3_600, "Once Hourly"));
        schedules.insert_if_absent("twicedaily", IntervalSpec::new(43_200, "Twice Daily"));
        schedules.insert_if_absent("daily", IntervalSpec::new(86_400, "Once Daily"));
        schedules.insert_if_absent("weekly", IntervalSpec::new(604_800, "Once Weekly"));
        schedules
    }

    /// Looks up an interval by token.
    pub fn get(&self, token: &str) -> Option<&IntervalSpec> {
        self.0.get(token)
    }

    /// Returns `true` if `token` names a known interval.
    pub fn contains(&self, token: &str) -> bool {
        self.0.contains_key(token)
    }

    /// Adds `spec` under `token` unless that token is already defined.
    ///
    /// Returns `true` if the entry was added.
    pub fn insert_if_absent(&mut self, token: impl Into<String>, spec: IntervalSpec) -> bool {
        match self.0.entry(token.into()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(spec);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Iterates intervals in token order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IntervalSpec)> {
        self.0.iter().map(|(token, spec)| (token.as_str(), spec))
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Snapshot returned by the status query. Purely derived; building one has
/// no side effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Configured schedule token.
    pub schedule: ScheduleToken,
    /// Human label for [`SyncStatus::schedule`].
    pub schedule_display: String,
    /// When the last scheduled sync completed.
    pub last_sync: Option<Timestamp>,
    /// When the trigger will next fire.
    pub next_sync: Option<Timestamp>,
    /// Whether any firing of the sync trigger is pending.
    pub is_scheduled: bool,
    /// Full per-project result history.
    pub sync_results: BTreeMap<ProjectId, SyncHistory>,
}
