//! The sync-and-summarise pipeline.

use std::future::Future;
use std::sync::Arc;

use pipeline::{ProjectId, PromptComposer, Settings, Summarizer, TaskFilter, TaskSource};
use tracing::{debug, info, instrument};

/// Substituted for a summary the backend could not produce.
pub const SUMMARY_UNAVAILABLE: &str = "Unable to generate summary.";

/// Runs one fetch → filter → compose → summarise pass.
///
/// Failures in the task source or the summariser never abort a pass: they
/// surface as an empty task list and as [`SUMMARY_UNAVAILABLE`]
/// respectively. There are no retries at this layer.
#[derive(Clone)]
pub struct SyncOrchestrator {
    tasks: Arc<dyn TaskSource>,
    summarizer: Arc<dyn Summarizer>,
    composer: PromptComposer,
    default_project: Option<ProjectId>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("composer", &self.composer)
            .field("default_project", &self.default_project)
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// Creates an orchestrator with the default user directory and no
    /// default project.
    pub fn new(tasks: Arc<dyn TaskSource>, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            tasks,
            summarizer,
            composer: PromptComposer::default(),
            default_project: None,
        }
    }

    /// Replaces the prompt composer.
    pub fn with_composer(mut self, composer: PromptComposer) -> Self {
        self.composer = composer;
        self
    }

    /// Sets the project used by [`SyncOrchestrator::run`].
    pub fn with_default_project(mut self, project: Option<ProjectId>) -> Self {
        self.default_project = project;
        self
    }

    /// The project used by [`SyncOrchestrator::run`], if any.
    pub fn default_project(&self) -> Option<&ProjectId> {
        self.default_project.as_ref()
    }

    /// Fetches the tasks of `project`, narrows them with `filter`, and
    /// composes the prompt that would be summarised.
    #[instrument(skip_all, fields(project = %project, stages = filter.stages().len()))]
    pub async fn prompt_for(&self, project: &ProjectId, filter: &TaskFilter) -> String {
        let fetched = self.tasks.fetch_all_tasks(project).await;
        let selected = filter.apply(&fetched);
        debug!(
            fetched = fetched.len(),
            selected = selected.len(),
            "Composing prompt"
        );
        self.composer.compose(&selected)
    }

    /// Filtered summary of `project`.
    ///
    /// With an empty filter this equals summarising the composed prompt of
    /// every fetched task.
    pub async fn run_filtered(&self, project: &ProjectId, filter: &TaskFilter) -> String {
        let prompt = self.prompt_for(project, filter).await;
        self.summarize(&prompt).await
    }

    /// Unfiltered summary of the default project, handed to `persist` before
    /// it is returned.
    ///
    /// Returns `Ok(None)` without doing anything when no default project is
    /// configured.
    pub async fn run<F, Fut, E>(&self, persist: F) -> Result<Option<String>, E>
    where
        F: FnOnce(ProjectId, String) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let Some(project) = self.default_project.clone() else {
            info!("No default project configured; nothing to run");
            return Ok(None);
        };

        let summary = self.run_filtered(&project, &TaskFilter::new()).await;
        persist(project, summary.clone()).await?;
        Ok(Some(summary))
    }

    async fn summarize(&self, prompt: &str) -> String {
        self.summarizer
            .summarize(prompt)
            .await
            .unwrap_or_else(|| SUMMARY_UNAVAILABLE.to_string())
    }
}

/// Builds a [`SyncOrchestrator`] wired with the credentials and limits in
/// the given settings.
///
/// Invoked once per scheduler firing and once per on-demand call, so
/// settings changes take effect without a restart.
pub trait OrchestratorFactory: Send + Sync {
    /// Constructs an orchestrator for `settings`.
    fn build(&self, settings: &Settings) -> SyncOrchestrator;
}
