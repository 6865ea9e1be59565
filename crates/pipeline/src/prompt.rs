//! Deterministic prompt construction.
//!
//! Output format is stable: downstream consumers and golden tests match on
//! it byte for byte.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::{Task, UserId};

/// Emitted verbatim when there is nothing to summarise.
pub const NO_TASKS_PROMPT: &str = "No tasks found to summarize.";

/// First line of every non-empty prompt, followed by a blank line.
pub const PROMPT_PREAMBLE: &str = "Please summarize the following tasks:";

/// Assignee label for tasks without a resolvable first assignee.
pub const UNASSIGNED: &str = "Unassigned";

const NO_DESCRIPTION: &str = "No description";
const UNKNOWN_STATUS: &str = "Unknown";

/// Static mapping from tracker user id to display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDirectory(BTreeMap<UserId, String>);

impl UserDirectory {
    /// Builds a directory from `(id, name)` pairs.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u64, S)>,
        S: Into<String>,
    {
        Self(
            entries
                .into_iter()
                .map(|(id, name)| (UserId::new(id), name.into()))
                .collect(),
        )
    }

    /// Display name for `user`, if known.
    pub fn name_of(&self, user: UserId) -> Option<&str> {
        self.0.get(&user).map(String::as_str)
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::new([
            (1, "Alice Johnson"),
            (2, "Bob Smith"),
            (3, "Charlie Brown"),
            (4, "Diana Prince"),
        ])
    }
}

/// Turns a task collection into a single natural-language request.
#[derive(Debug, Clone, Default)]
pub struct PromptComposer {
    directory: UserDirectory,
}

impl PromptComposer {
    /// A composer resolving assignees through `directory`.
    pub fn new(directory: UserDirectory) -> Self {
        Self { directory }
    }

    /// Composes the prompt for `tasks`, preserving their order.
    ///
    /// Each task becomes a four-line block followed by a blank line:
    ///
    /// ```text
    /// Task #1: Fix login bug
    /// Status: todo
    /// Assignee: Alice Johnson
    /// ```
    pub fn compose(&self, tasks: &[Task]) -> String {
        if tasks.is_empty() {
            return NO_TASKS_PROMPT.to_string();
        }

        let mut prompt = format!("{PROMPT_PREAMBLE}\n\n");
        for task in tasks {
            // Writing into a String cannot fail.
            let _ = write!(
                prompt,
                "Task #{}: {}\nStatus: {}\nAssignee: {}\n\n",
                task.id,
                task.description.as_deref().unwrap_or(NO_DESCRIPTION),
                task.status.as_deref().unwrap_or(UNKNOWN_STATUS),
                self.assignee_name(task),
            );
        }
        prompt
    }

    /// Resolves the first assignee only; anything else is [`UNASSIGNED`].
    pub fn assignee_name<'a>(&'a self, task: &Task) -> &'a str {
        task.primary_assignee()
            .and_then(|user| self.directory.name_of(user))
            .unwrap_or(UNASSIGNED)
    }
}
