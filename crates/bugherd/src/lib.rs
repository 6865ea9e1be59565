//! Issue-tracker infrastructure adapter.
//!
//! Implements [`pipeline::TaskSource`] for the BugHerd REST API.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules.
//! HTTP transport, authentication, pagination and response decoding are
//! handled here; the [`pipeline`] crate never sees them.
//!
//! ## Modes
//!
//! The client is built in one of two [`TrackerMode`]s:
//!
//! - [`TrackerMode::Demo`]: no credential configured. No network I/O is
//!   attempted; [`demo_tasks`] is returned for every project so the rest of
//!   the pipeline stays exercisable.
//! - [`TrackerMode::Live`]: pages through
//!   `GET {base}/projects/{id}/tasks.json?page={n}` with Basic auth
//!   (`api_key:x`) until a page comes back with no tasks.
//!
//! Transport failures are absorbed: [`pipeline::TaskSource::fetch_all_tasks`]
//! logs them and returns an empty collection. [`BugherdClient::try_fetch_all_tasks`]
//! exposes the underlying error for callers that want it.

use async_trait::async_trait;
use pipeline::{ProjectId, Task, TaskSource};
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://www.bugherd.com/api_v2";

/// Password half of the Basic credential; the API key is the user half.
const BASIC_AUTH_PASSWORD: &str = "x";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures talking to the tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The client is in demo mode and has no credential to call with.
    #[error("No tracker API key configured")]
    NoApiKey,

    /// The configured API root cannot be extended with a request path.
    #[error("Invalid tracker base URL '{url}': {message}")]
    BaseUrl {
        /// The configured API root.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    /// The request could not be sent or the response body not read.
    #[error("Tracker request for page {page} failed: {source}")]
    Transport {
        /// Page being fetched.
        page: u32,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The tracker answered with a non-success status.
    #[error("Tracker returned HTTP {status} for page {page}")]
    Status {
        /// Page being fetched.
        page: u32,
        /// HTTP status code.
        status: u16,
    },

    /// The response body was not the expected JSON shape.
    #[error("Tracker page {page} could not be decoded: {source}")]
    Decode {
        /// Page being fetched.
        page: u32,
        /// Underlying decode error.
        #[source]
        source: reqwest::Error,
    },
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Whether the client talks to the network. Selected once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerMode {
    /// Serve [`demo_tasks`] without network access.
    Demo,
    /// Call the API with this key.
    Live {
        /// Tracker API key.
        api_key: String,
    },
}

impl TrackerMode {
    /// `Live` for a non-blank key, `Demo` otherwise.
    pub fn from_api_key(api_key: Option<&str>) -> Self {
        match api_key.map(str::trim) {
            Some(key) if !key.is_empty() => Self::Live {
                api_key: key.to_string(),
            },
            _ => Self::Demo,
        }
    }
}

/// The fixed task set served in demo mode.
pub fn demo_tasks() -> Vec<Task> {
    vec![
        Task::new(1, "Fix login bug", "todo", [1]),
        Task::new(2, "Update user interface", "in_progress", [2]),
        Task::new(3, "Write documentation", "done", [3]),
    ]
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

// Tasks are decoded one by one so a single malformed entry does not cost
// the whole page.
#[derive(Debug, Deserialize)]
struct TaskPage {
    #[serde(default)]
    tasks: Option<Vec<serde_json::Value>>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Paginating BugHerd client.
#[derive(Debug, Clone)]
pub struct BugherdClient {
    http: reqwest::Client,
    base_url: String,
    mode: TrackerMode,
    max_tasks: Option<usize>,
}

impl BugherdClient {
    /// Creates a client against the production API.
    pub fn new(mode: TrackerMode) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            mode,
            max_tasks: None,
        }
    }

    /// Points the client at a different API root (e.g. a test server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Stops paging once `cap` tasks have been collected. `None` is unbounded.
    pub fn with_max_tasks(mut self, cap: Option<usize>) -> Self {
        self.max_tasks = cap;
        self
    }

    /// The mode this client was built in.
    pub fn mode(&self) -> &TrackerMode {
        &self.mode
    }

    /// Fetches every page for `project`, surfacing the first failure.
    ///
    /// Pages are requested strictly one after another starting at page 1.
    /// Paging stops at the first page whose `tasks` field is empty or absent,
    /// or once the configured cap is reached (the result is truncated to the
    /// cap).
    #[instrument(skip_all, fields(project = %project))]
    pub async fn try_fetch_all_tasks(&self, project: &ProjectId) -> Result<Vec<Task>, TrackerError> {
        let TrackerMode::Live { api_key } = &self.mode else {
            return Err(TrackerError::NoApiKey);
        };

        let url = self.tasks_url(project)?;
        let mut tasks = Vec::new();
        let mut page: u32 = 1;

        loop {
            let response = self
                .http
                .get(url.clone())
                .query(&[("page", page)])
                .basic_auth(api_key, Some(BASIC_AUTH_PASSWORD))
                .header(CONTENT_TYPE, "application/json")
                .send()
                .await
                .map_err(|source| TrackerError::Transport { page, source })?;

            let status = response.status();
            if !status.is_success() {
                return Err(TrackerError::Status {
                    page,
                    status: status.as_u16(),
                });
            }

            let body: TaskPage = response
                .json()
                .await
                .map_err(|source| TrackerError::Decode { page, source })?;

            let batch = body.tasks.unwrap_or_default();
            if batch.is_empty() {
                debug!(page, total = tasks.len(), "Reached last tracker page");
                break;
            }
            for raw in batch {
                match serde_json::from_value::<Task>(raw) {
                    Ok(task) => tasks.push(task),
                    Err(error) => warn!(page, %error, "Skipping malformed tracker task"),
                }
            }

            if let Some(cap) = self.max_tasks {
                if tasks.len() >= cap {
                    debug!(page, cap, "Task cap reached; stopping pagination");
                    tasks.truncate(cap);
                    break;
                }
            }

            page = page.saturating_add(1);
        }

        Ok(tasks)
    }
}

impl BugherdClient {
    /// `{base}/projects/{project}/tasks.json`, with the project id escaped as
    /// a single path segment.
    fn tasks_url(&self, project: &ProjectId) -> Result<Url, TrackerError> {
        let invalid = |message: String| TrackerError::BaseUrl {
            url: self.base_url.clone(),
            message,
        };

        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["projects", project.as_str(), "tasks.json"]);
        Ok(url)
    }
}

#[async_trait]
impl TaskSource for BugherdClient {
    async fn fetch_all_tasks(&self, project: &ProjectId) -> Vec<Task> {
        if self.mode == TrackerMode::Demo {
            debug!(%project, "No tracker API key; serving demo tasks");
            return demo_tasks();
        }

        match self.try_fetch_all_tasks(project).await {
            Ok(tasks) => tasks,
            Err(error) => {
                warn!(%project, %error, "Tracker fetch failed; continuing with no tasks");
                Vec::new()
            }
        }
    }
}
