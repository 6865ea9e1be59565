//! Builds orchestrators over the real tracker and completion clients.

use std::sync::Arc;

use bugherd::{BugherdClient, TrackerMode};
use llm::{OpenAiConfig, OpenAiSummarizer, SummarizerMode};
use orchestrator::{OrchestratorFactory, SyncOrchestrator};
use pipeline::Settings;
use tracing::debug;

/// Wires [`BugherdClient`] and [`OpenAiSummarizer`] from the current
/// settings. Each client runs in demo mode when its key is blank.
#[derive(Debug, Clone)]
pub struct LiveOrchestratorFactory {
    tracker_base_url: String,
    completion: OpenAiConfig,
}

impl LiveOrchestratorFactory {
    /// Creates a factory targeting the given endpoints.
    pub fn new(tracker_base_url: impl Into<String>, completion: OpenAiConfig) -> Self {
        Self {
            tracker_base_url: tracker_base_url.into(),
            completion,
        }
    }
}

impl OrchestratorFactory for LiveOrchestratorFactory {
    fn build(&self, settings: &Settings) -> SyncOrchestrator {
        let credentials = settings.credentials();
        let tracker_mode = TrackerMode::from_api_key(credentials.tracker_api_key.as_deref());
        let summarizer_mode =
            SummarizerMode::from_api_key(credentials.summarizer_api_key.as_deref());
        debug!(
            tracker_demo = tracker_mode == TrackerMode::Demo,
            summarizer_demo = summarizer_mode == SummarizerMode::Demo,
            "Building orchestrator"
        );

        let tasks = BugherdClient::new(tracker_mode)
            .with_base_url(self.tracker_base_url.as_str())
            .with_max_tasks(settings.task_cap());
        let summarizer = OpenAiSummarizer::with_config(summarizer_mode, self.completion.clone());

        SyncOrchestrator::new(Arc::new(tasks), Arc::new(summarizer))
            .with_default_project(settings.default_project_id())
    }
}
