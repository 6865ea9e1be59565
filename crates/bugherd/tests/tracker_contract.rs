//! Tracker client contract tests.
//!
//! Verify the exact request shape (path, page query, Basic credential,
//! content type), the pagination stop rules, the task cap, and that every
//! failure degrades to an empty task list.

use bugherd::{BugherdClient, TrackerError, TrackerMode};
use pipeline::{ProjectId, TaskSource};
use serde_json::json;
use wiremock::matchers::{basic_auth, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "tracker-key";

fn project() -> ProjectId {
    ProjectId::new("4242").expect("non-empty id")
}

fn live_client(server: &MockServer) -> BugherdClient {
    BugherdClient::new(TrackerMode::Live {
        api_key: API_KEY.to_string(),
    })
    .with_base_url(server.uri())
}

fn task_json(id: u64, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "description": format!("Task {id}"),
        "status": status,
        "assignee_ids": [id]
    })
}

async fn mount_page(server: &MockServer, page: &str, body: serde_json::Value, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/projects/4242/tasks.json"))
        .and(query_param("page", page))
        .and(basic_auth(API_KEY, "x"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_pages_are_accumulated_until_an_empty_page() {
    let server = MockServer::start().await;
    mount_page(&server, "1", json!({"tasks": [task_json(1, "todo"), task_json(2, "done")]}), 1).await;
    mount_page(&server, "2", json!({"tasks": [task_json(3, "todo")]}), 1).await;
    mount_page(&server, "3", json!({"tasks": []}), 1).await;

    let tasks = live_client(&server).fetch_all_tasks(&project()).await;

    let ids: Vec<_> = tasks.iter().map(|t| t.id.as_u64()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_absent_tasks_field_ends_pagination() {
    let server = MockServer::start().await;
    mount_page(&server, "1", json!({"tasks": [task_json(1, "todo")]}), 1).await;
    mount_page(&server, "2", json!({"meta": {"count": 1}}), 1).await;

    let tasks = live_client(&server)
        .try_fetch_all_tasks(&project())
        .await
        .expect("fetch succeeds");

    assert_eq!(tasks.len(), 1);
}

#[tokio::test]
async fn test_null_assignees_decode_as_unassigned() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "1",
        json!({"tasks": [{"id": 8, "description": null, "status": "todo", "assignee_ids": null}]}),
        1,
    )
    .await;
    mount_page(&server, "2", json!({"tasks": []}), 1).await;

    let tasks = live_client(&server).fetch_all_tasks(&project()).await;

    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].assignee_ids.is_empty());
    assert!(tasks[0].description.is_none());
}

#[tokio::test]
async fn test_task_cap_stops_pagination_and_truncates() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "1",
        json!({"tasks": [task_json(1, "todo"), task_json(2, "todo"), task_json(3, "todo")]}),
        1,
    )
    .await;
    mount_page(&server, "2", json!({"tasks": [task_json(4, "todo")]}), 0).await;

    let tasks = live_client(&server)
        .with_max_tasks(Some(2))
        .fetch_all_tasks(&project())
        .await;

    let ids: Vec<_> = tasks.iter().map(|t| t.id.as_u64()).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn test_server_error_degrades_to_empty() {
    let server = MockServer::start().await;
    mount_page(&server, "1", json!({"tasks": [task_json(1, "todo")]}), 2).await;
    Mock::given(method("GET"))
        .and(path("/projects/4242/tasks.json"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let client = live_client(&server);

    assert!(client.fetch_all_tasks(&project()).await.is_empty());
    assert!(matches!(
        client.try_fetch_all_tasks(&project()).await,
        Err(TrackerError::Status { page: 2, status: 500 })
    ));
}

#[tokio::test]
async fn test_malformed_body_degrades_to_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/4242/tasks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = live_client(&server);

    assert!(client.fetch_all_tasks(&project()).await.is_empty());
    assert!(matches!(
        client.try_fetch_all_tasks(&project()).await,
        Err(TrackerError::Decode { page: 1, .. })
    ));
}

#[tokio::test]
async fn test_unreachable_server_degrades_to_empty() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = BugherdClient::new(TrackerMode::Live {
        api_key: API_KEY.to_string(),
    })
    .with_base_url(uri);

    assert!(client.fetch_all_tasks(&project()).await.is_empty());
}

#[tokio::test]
async fn test_demo_mode_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tasks": []})))
        .expect(0)
        .mount(&server)
        .await;

    let tasks = BugherdClient::new(TrackerMode::Demo)
        .with_base_url(server.uri())
        .fetch_all_tasks(&project())
        .await;

    assert_eq!(tasks.len(), 3);
}

#[tokio::test]
async fn test_malformed_task_is_skipped_and_the_rest_kept() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "1",
        json!({"tasks": [
            task_json(1, "todo"),
            {"id": "seven", "description": "bad id"},
            {"description": "no id", "status": "done", "assignee_ids": ["2", "x"]},
        ]}),
        1,
    )
    .await;
    mount_page(&server, "2", json!({"tasks": []}), 1).await;

    let tasks = live_client(&server)
        .try_fetch_all_tasks(&project())
        .await
        .expect("fetch succeeds");

    let ids: Vec<_> = tasks.iter().map(|t| t.id.as_u64()).collect();
    assert_eq!(ids, vec![1, 0]);
    assert_eq!(tasks[1].primary_assignee().map(|u| u.as_u64()), Some(2));
}

#[tokio::test]
async fn test_project_id_with_reserved_characters_stays_in_the_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/team%2F7%3Fx/tasks.json"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tasks": []})))
        .expect(1)
        .mount(&server)
        .await;

    let tasks = live_client(&server)
        .try_fetch_all_tasks(&ProjectId::new("team/7?x").expect("id"))
        .await
        .expect("fetch succeeds");

    assert!(tasks.is_empty());
}
