//! End-to-end pipeline runs against the credential-less tracker and
//! summariser clients.

use std::sync::Arc;

use bugherd::{BugherdClient, TrackerMode};
use llm::{OpenAiSummarizer, SummarizerMode, MOCK_SUMMARY};
use orchestrator::SyncOrchestrator;
use pipeline::{ProjectId, TaskFilter};

fn demo_orchestrator() -> SyncOrchestrator {
    SyncOrchestrator::new(
        Arc::new(BugherdClient::new(TrackerMode::Demo)),
        Arc::new(OpenAiSummarizer::new(SummarizerMode::Demo)),
    )
    .with_default_project(ProjectId::new("demo"))
}

#[tokio::test]
async fn test_default_run_produces_mock_summary() {
    let orchestrator = demo_orchestrator();
    let mut persisted = Vec::new();

    let summary = orchestrator
        .run(|project, summary| {
            persisted.push((project, summary));
            async { Ok::<(), std::convert::Infallible>(()) }
        })
        .await
        .expect("infallible");

    assert_eq!(summary.as_deref(), Some(MOCK_SUMMARY));
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].1, MOCK_SUMMARY);
}

#[tokio::test]
async fn test_status_filter_selects_only_the_todo_task() {
    let orchestrator = demo_orchestrator();
    let project = ProjectId::new("demo").expect("id");
    let filter = TaskFilter::from_parts("todo", 0, "");

    let prompt = orchestrator.prompt_for(&project, &filter).await;
    let summary = orchestrator.run_filtered(&project, &filter).await;

    assert_eq!(
        prompt,
        "Please summarize the following tasks:\n\n\
         Task #1: Fix login bug\n\
         Status: todo\n\
         Assignee: Alice Johnson\n\n"
    );
    assert_eq!(summary, MOCK_SUMMARY);
}

#[tokio::test]
async fn test_keyword_without_matches_yields_empty_prompt() {
    let orchestrator = demo_orchestrator();
    let project = ProjectId::new("demo").expect("id");

    let prompt = orchestrator
        .prompt_for(&project, &TaskFilter::from_parts("", 0, "nonexistent"))
        .await;

    assert_eq!(prompt, pipeline::NO_TASKS_PROMPT);
}
