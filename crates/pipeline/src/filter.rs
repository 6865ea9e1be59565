//! Task filtering.
//!
//! Three pure predicates (status, assignee, keyword) narrow a fetched task
//! collection. A [`TaskFilter`] is an ordered list of [`FilterStage`]s folded
//! left to right; each stage copies the surviving tasks into a new vector and
//! never touches its input.

use crate::{Task, UserId};

/// Keeps tasks whose status equals `status` exactly (case-sensitive).
pub fn by_status(tasks: &[Task], status: &str) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| task.status.as_deref() == Some(status))
        .cloned()
        .collect()
}

/// Keeps tasks assigned to `user`. Unassigned tasks never match.
pub fn by_assignee(tasks: &[Task], user: UserId) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| task.assignee_ids.contains(&user))
        .cloned()
        .collect()
}

/// Keeps tasks whose description contains `keyword`, ignoring case.
///
/// A missing description is treated as empty.
pub fn by_keyword(tasks: &[Task], keyword: &str) -> Vec<Task> {
    let needle = keyword.to_lowercase();
    tasks
        .iter()
        .filter(|task| {
            task.description
                .as_deref()
                .unwrap_or_default()
                .to_lowercase()
                .contains(&needle)
        })
        .cloned()
        .collect()
}

/// One narrowing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterStage {
    /// See [`by_status`].
    Status(String),
    /// See [`by_assignee`].
    Assignee(UserId),
    /// See [`by_keyword`].
    Keyword(String),
}

impl FilterStage {
    /// Applies this stage to `tasks`.
    pub fn apply(&self, tasks: &[Task]) -> Vec<Task> {
        match self {
            Self::Status(status) => by_status(tasks, status),
            Self::Assignee(user) => by_assignee(tasks, *user),
            Self::Keyword(keyword) => by_keyword(tasks, keyword),
        }
    }
}

/// An ordered filter pipeline. The default filter keeps everything.
///
/// Builder methods skip empty arguments, so a filter built from blank form
/// input is a no-op. Stages run in insertion order; the conventional order is
/// status, then assignee, then keyword.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    stages: Vec<FilterStage>,
}

impl TaskFilter {
    /// A filter with no stages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the conventional status → assignee → keyword pipeline from raw
    /// arguments, where `""` and `0` mean "no filter".
    pub fn from_parts(status: &str, user_id: u64, keyword: &str) -> Self {
        Self::new()
            .with_status(status)
            .with_assignee(user_id)
            .with_keyword(keyword)
    }

    /// Adds a status stage unless `status` is empty.
    pub fn with_status(self, status: impl Into<String>) -> Self {
        let status = status.into();
        if status.is_empty() {
            self
        } else {
            self.with_stage(FilterStage::Status(status))
        }
    }

    /// Adds an assignee stage unless `user_id` is zero.
    pub fn with_assignee(self, user_id: u64) -> Self {
        if user_id == 0 {
            self
        } else {
            self.with_stage(FilterStage::Assignee(UserId::new(user_id)))
        }
    }

    /// Adds a keyword stage unless `keyword` is empty.
    pub fn with_keyword(self, keyword: impl Into<String>) -> Self {
        let keyword = keyword.into();
        if keyword.is_empty() {
            self
        } else {
            self.with_stage(FilterStage::Keyword(keyword))
        }
    }

    /// Appends an arbitrary stage.
    pub fn with_stage(mut self, stage: FilterStage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Stages in application order.
    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    /// Returns `true` if the filter keeps every task.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage over `tasks`, left to right.
    pub fn apply(&self, tasks: &[Task]) -> Vec<Task> {
        self.stages
            .iter()
            .fold(tasks.to_vec(), |narrowed, stage| stage.apply(&narrowed))
    }
}
