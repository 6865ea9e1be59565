//! Process-wide configuration schema.
//!
//! [`Settings`] is a plain value: the store hands out a fresh copy on every
//! read (with defaults merged in for any key that was never written) and the
//! orchestrator and scheduler receive what they need from it explicitly.
//!
//! Besides typed field access, settings can be read and written by string key
//! (`get` / `set` / `update`) so that host surfaces can treat them as a
//! key-value map. Unknown keys and badly-shaped values are rejected.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    ProjectConfig, ProjectId, ScheduleToken, SettingsError, Timestamp, FIFTEEN_MINUTES,
    THIRTY_MINUTES,
};

/// Every key recognised by the settings schema.
pub const SETTING_KEYS: &[&str] = &[
    "bugherd_api_key",
    "openai_api_key",
    "default_project_id",
    "projects",
    "sync_schedule",
    "enable_notifications",
    "notification_email",
    "max_tasks_per_sync",
    "cache_duration",
    "debug_mode",
];

const SECRET_KEYS: &[&str] = &["bugherd_api_key", "openai_api_key"];

/// Schedule tokens offered to users, with their display labels.
pub const SCHEDULE_OPTIONS: &[(&str, &str)] = &[
    ("disabled", "Disabled"),
    ("hourly", "Every Hour"),
    ("daily", "Daily"),
    ("weekly", "Weekly"),
];

/// Stored configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Issue-tracker API key. Empty means demo mode.
    pub bugherd_api_key: String,
    /// Completion API key. Empty means demo mode.
    pub openai_api_key: String,
    /// Project synced when no project map is configured.
    pub default_project_id: String,
    /// Configured projects keyed by id.
    pub projects: BTreeMap<ProjectId, ProjectConfig>,
    /// Recurrence of the scheduled sync.
    pub sync_schedule: ScheduleToken,
    /// Whether sync outcomes are e-mailed.
    pub enable_notifications: bool,
    /// Notification recipient. Empty falls back to the host admin address.
    pub notification_email: String,
    /// Upper bound on tasks fetched per project per sync. `0` is unbounded.
    pub max_tasks_per_sync: u32,
    /// Declared fetch cache lifetime in seconds. No cache consumes it.
    pub cache_duration: u64,
    /// Raises workspace log verbosity and logs each stored summary.
    pub debug_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bugherd_api_key: String::new(),
            openai_api_key: String::new(),
            default_project_id: String::new(),
            projects: BTreeMap::new(),
            sync_schedule: ScheduleToken::Daily,
            enable_notifications: true,
            notification_email: String::new(),
            max_tasks_per_sync: 100,
            cache_duration: 3_600,
            debug_mode: false,
        }
    }
}

/// API credentials handed to the sync pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Issue-tracker key, `None` when not configured.
    pub tracker_api_key: Option<String>,
    /// Completion API key, `None` when not configured.
    pub summarizer_api_key: Option<String>,
}

/// Input for [`Settings::add_project`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDraft {
    /// External tracker project id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to `true`.
    #[serde(default)]
    pub active: Option<bool>,
}

impl Settings {
    // -----------------------------------------------------------------------
    // Typed accessors
    // -----------------------------------------------------------------------

    /// Issue-tracker key, if one is configured.
    pub fn bugherd_api_key(&self) -> Option<&str> {
        non_empty(&self.bugherd_api_key)
    }

    /// Completion API key, if one is configured.
    pub fn openai_api_key(&self) -> Option<&str> {
        non_empty(&self.openai_api_key)
    }

    /// Default project, if one is configured.
    pub fn default_project_id(&self) -> Option<ProjectId> {
        ProjectId::new(self.default_project_id.as_str())
    }

    /// Both API credentials.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            tracker_api_key: self.bugherd_api_key().map(str::to_string),
            summarizer_api_key: self.openai_api_key().map(str::to_string),
        }
    }

    /// Projects a scheduled sync should visit, in id order.
    ///
    /// When any project is configured, only the active ones are returned;
    /// otherwise the default project is the single target.
    pub fn sync_targets(&self) -> Vec<ProjectId> {
        if self.projects.is_empty() {
            return self.default_project_id().into_iter().collect();
        }
        self.projects
            .values()
            .filter(|project| project.active)
            .map(|project| project.id.clone())
            .collect()
    }

    /// Where notifications go, or `None` when they are disabled or no
    /// address is known.
    pub fn notification_recipient(&self, admin_email: Option<&str>) -> Option<String> {
        if !self.enable_notifications {
            return None;
        }
        non_empty(&self.notification_email)
            .or_else(|| admin_email.and_then(non_empty))
            .map(str::to_string)
    }

    /// The pagination cap, `None` when unbounded.
    pub fn task_cap(&self) -> Option<usize> {
        match self.max_tasks_per_sync {
            0 => None,
            cap => usize::try_from(cap).ok(),
        }
    }

    // -----------------------------------------------------------------------
    // Key-value access
    // -----------------------------------------------------------------------

    /// Reads a setting by key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.as_map().remove(key)
    }

    /// Reads a setting by key, returning `default` for unknown keys.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Writes a single setting.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), SettingsError> {
        let mut changes = Map::new();
        changes.insert(key.to_string(), value);
        self.update(changes)
    }

    /// Writes several settings at once. Either every change applies or none
    /// does.
    pub fn update(&mut self, changes: Map<String, Value>) -> Result<(), SettingsError> {
        let mut next = self.clone();
        for (key, value) in changes {
            if !SETTING_KEYS.contains(&key.as_str()) {
                return Err(SettingsError::UnknownKey { key });
            }
            let mut map = next.as_map();
            map.insert(key.clone(), value);
            next = serde_json::from_value(Value::Object(map)).map_err(|e| {
                SettingsError::InvalidValue {
                    key,
                    message: e.to_string(),
                }
            })?;
        }
        *self = next;
        Ok(())
    }

    fn as_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    /// Inserts or replaces a project, stamping both timestamps with now.
    pub fn add_project(&mut self, draft: ProjectDraft) -> Result<&ProjectConfig, SettingsError> {
        let id = ProjectId::new(draft.id).ok_or(SettingsError::IncompleteProject)?;
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(SettingsError::IncompleteProject);
        }

        let now = Timestamp::now();
        let project = ProjectConfig {
            id: id.clone(),
            name: name.to_string(),
            description: draft.description.unwrap_or_default().trim().to_string(),
            active: draft.active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };
        Ok(match self.projects.entry(id) {
            Entry::Occupied(mut slot) => {
                slot.insert(project);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(project),
        })
    }

    /// Removes a project. Returns `false` if it was not configured.
    pub fn remove_project(&mut self, id: &ProjectId) -> bool {
        self.projects.remove(id).is_some()
    }

    // -----------------------------------------------------------------------
    // Backup
    // -----------------------------------------------------------------------

    /// Pretty JSON of all settings with API keys blanked.
    pub fn export(&self) -> String {
        let mut redacted = self.clone();
        redacted.bugherd_api_key.clear();
        redacted.openai_api_key.clear();
        serde_json::to_string_pretty(&redacted).unwrap_or_default()
    }

    /// Applies an exported blob. API keys and unknown keys are ignored.
    pub fn import(&mut self, json: &str) -> Result<(), SettingsError> {
        let parsed: Value =
            serde_json::from_str(json).map_err(|e| SettingsError::MalformedImport {
                message: e.to_string(),
            })?;
        let Value::Object(imported) = parsed else {
            return Err(SettingsError::MalformedImport {
                message: "top-level value is not an object".to_string(),
            });
        };

        let accepted: Map<String, Value> = imported
            .into_iter()
            .filter(|(key, _)| {
                SETTING_KEYS.contains(&key.as_str()) && !SECRET_KEYS.contains(&key.as_str())
            })
            .collect();
        self.update(accepted)
    }

    /// Sanitises raw form input into a map suitable for [`Settings::update`].
    ///
    /// Unrecognised keys, unknown schedule tokens and malformed e-mail
    /// addresses are dropped; text is trimmed; numbers become non-negative
    /// integers; flags become booleans.
    pub fn validate(raw: &Map<String, Value>) -> Map<String, Value> {
        let mut validated = Map::new();

        for key in ["bugherd_api_key", "openai_api_key", "default_project_id"] {
            if let Some(value) = raw.get(key) {
                validated.insert(key.to_string(), Value::String(text(value)));
            }
        }

        if let Some(value) = raw.get("sync_schedule") {
            let token = text(value);
            if is_known_schedule(&token) {
                validated.insert("sync_schedule".to_string(), Value::String(token));
            }
        }

        for key in ["enable_notifications", "debug_mode"] {
            if let Some(value) = raw.get(key) {
                validated.insert(key.to_string(), Value::Bool(truthy(value)));
            }
        }

        if let Some(value) = raw.get("notification_email") {
            let email = text(value);
            if looks_like_email(&email) {
                validated.insert("notification_email".to_string(), Value::String(email));
            }
        }

        for key in ["max_tasks_per_sync", "cache_duration"] {
            if let Some(value) = raw.get(key) {
                validated.insert(key.to_string(), Value::from(absint(value)));
            }
        }

        validated
    }
}

/// Returns `true` for tokens the settings form accepts: the built-in
/// schedule options plus the scheduler's custom intervals.
pub fn is_known_schedule(token: &str) -> bool {
    SCHEDULE_OPTIONS.iter().any(|(option, _)| *option == token)
        || token == FIFTEEN_MINUTES
        || token == THIRTY_MINUTES
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Null => false,
    }
}

fn absint(value: &Value) -> u64 {
    let signed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        Value::Bool(true) => 1,
        _ => 0,
    };
    signed.unsigned_abs()
}

fn looks_like_email(candidate: &str) -> bool {
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !candidate.chars().any(char::is_whitespace)
}
