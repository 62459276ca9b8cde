#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Jira client and sync tests against a mocked tracker API.

use kanban_tracker::{
    transition_issue, IssueTracker, JiraClient, TrackerConfig, TrackerSync, TrackerTarget,
};
use std::sync::Arc;
use wiremock::matchers::{body_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> JiraClient {
    JiraClient::new(&TrackerConfig {
        host: server.uri(),
        email: "dev@example.com".into(),
        api_token: "secret".into(),
    })
}

fn transitions_body() -> serde_json::Value {
    serde_json::json!({
        "transitions": [
            {"id": "11", "name": "To Do", "to": {"name": "To Do"}},
            {"id": "21", "name": "Start work", "to": {"name": "In Progress"}},
            {"id": "31", "name": "Finish", "to": {"name": "Done"}}
        ]
    })
}

#[tokio::test]
async fn test_transition_to_done_executes_matching_transition() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/PROJ-1/transitions"))
        .and(header_exists("Authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(transitions_body()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/api/3/issue/PROJ-1/transitions"))
        .and(body_json(serde_json::json!({"transition": {"id": "31"}})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let outcome = transition_issue(&client, "PROJ-1", TrackerTarget::Done)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.transition_name, "Finish");
    assert_eq!(outcome.to_status.as_deref(), Some("Done"));
}

#[tokio::test]
async fn test_no_matching_transition_is_inert() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/PROJ-2/transitions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "transitions": [{"id": "1", "name": "Reopen", "to": {"name": "Open"}}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let outcome = transition_issue(&client, "PROJ-2", TrackerTarget::Done)
        .await
        .unwrap();
    assert!(outcome.is_none());
}

#[tokio::test]
async fn test_api_error_is_tracker_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/PROJ-3/transitions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.list_transitions("PROJ-3").await.unwrap_err();
    assert!(matches!(err, kanban_core::KanbanError::Tracker(_)));
}

#[tokio::test]
async fn test_sync_notify_swallows_failures() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/PROJ-4/transitions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let sync = TrackerSync::new(Some(Arc::new(client_for(&server))));
    let handle = sync.notify("PROJ-4", TrackerTarget::InProgress).unwrap();
    // The detached task completes without panicking.
    handle.await.unwrap();
}

#[tokio::test]
async fn test_sync_notify_in_progress() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/PROJ-5/transitions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(transitions_body()))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/api/3/issue/PROJ-5/transitions"))
        .and(body_json(serde_json::json!({"transition": {"id": "21"}})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let sync = TrackerSync::new(Some(Arc::new(client_for(&server))));
    sync.notify("PROJ-5", TrackerTarget::InProgress)
        .unwrap()
        .await
        .unwrap();
}

#[tokio::test]
async fn test_connection_and_search() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/myself"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "displayName": "Dev Eloper",
            "emailAddress": "dev@example.com"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/api/3/search/jql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "issues": [{
                "id": "10001",
                "key": "PROJ-6",
                "fields": {
                    "summary": "Add export",
                    "status": {"name": "To Do"},
                    "issuetype": {"name": "Story"},
                    "priority": {"name": "Medium"},
                    "project": {"name": "Project", "key": "PROJ"}
                }
            }]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let user = client.test_connection().await.unwrap();
    assert_eq!(user.display_name, "Dev Eloper");

    let issues = client.search_my_issues().await.unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].key, "PROJ-6");
    assert_eq!(issues[0].issue_type.as_deref(), Some("Story"));
}
