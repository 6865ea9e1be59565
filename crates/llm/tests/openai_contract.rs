//! Completion API contract tests.
//!
//! Verify the request format (path, bearer credential, system + user turns,
//! output bound), first-choice extraction, and that failures surface as
//! `None` through the `Summarizer` port.

use llm::{
    LlmError, OpenAiConfig, OpenAiSummarizer, SummarizerMode, MOCK_SUMMARY, SYSTEM_INSTRUCTION,
};
use pipeline::Summarizer;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn live(server: &MockServer) -> OpenAiSummarizer {
    OpenAiSummarizer::with_config(
        SummarizerMode::Live {
            api_key: "sk-test".to_string(),
        },
        OpenAiConfig::default().with_base_url(server.uri()),
    )
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"},
            {"index": 1, "message": {"role": "assistant", "content": "second choice"}, "finish_reason": "stop"}
        ]
    })
}

#[tokio::test]
async fn test_request_format_and_first_choice_extraction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_json(json!({
            "model": "gpt-3.5-turbo",
            "messages": [
                {"role": "system", "content": SYSTEM_INSTRUCTION},
                {"role": "user", "content": "Please summarize"}
            ],
            "max_tokens": 500
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("All good.")))
        .expect(1)
        .mount(&server)
        .await;

    let summary = live(&server).summarize("Please summarize").await;

    assert_eq!(summary.as_deref(), Some("All good."));
}

#[tokio::test]
async fn test_configured_model_and_bound_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(wiremock::matchers::body_partial_json(json!({"model": "gpt-4o-mini", "max_tokens": 64})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Short.")))
        .expect(1)
        .mount(&server)
        .await;

    let summarizer = OpenAiSummarizer::with_config(
        SummarizerMode::Live {
            api_key: "sk-test".to_string(),
        },
        OpenAiConfig::default()
            .with_base_url(server.uri())
            .with_model("gpt-4o-mini")
            .with_max_tokens(64),
    );

    assert_eq!(summarizer.summarize("p").await.as_deref(), Some("Short."));
}

#[tokio::test]
async fn test_api_error_surfaces_as_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .expect(2)
        .mount(&server)
        .await;

    let summarizer = live(&server);

    assert!(summarizer.summarize("p").await.is_none());
    assert!(matches!(
        summarizer.try_summarize("p").await,
        Err(LlmError::Status { status: 429, ref body }) if body == "rate limited"
    ));
}

#[tokio::test]
async fn test_empty_choices_surface_as_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    assert!(live(&server).summarize("p").await.is_none());
}

#[tokio::test]
async fn test_malformed_body_surfaces_as_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let summarizer = live(&server);

    assert!(summarizer.summarize("p").await.is_none());
    assert!(matches!(
        summarizer.try_summarize("p").await,
        Err(LlmError::Decode(_))
    ));
}

#[tokio::test]
async fn test_demo_mode_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let summarizer = OpenAiSummarizer::with_config(
        SummarizerMode::Demo,
        OpenAiConfig::default().with_base_url(server.uri()),
    );

    assert_eq!(summarizer.summarize("p").await.as_deref(), Some(MOCK_SUMMARY));
}
