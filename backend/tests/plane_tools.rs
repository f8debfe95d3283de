//! Tool tests against a fake Plane API served on an ephemeral port.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

use plane_mcp::mcp::{CallToolResult, DispatchError, ToolCall, ToolDispatcher};
use plane_mcp::plane::{PlaneClient, PlaneSettings};
use plane_mcp::tools::PlaneTools;

const API_KEY: &str = "test-key";
const PROJECT_ID: &str = "11111111-1111-4111-8111-111111111111";
const ISSUE_ID: &str = "22222222-2222-4222-8222-222222222222";

/// Requests the fake server saw, as `METHOD path`, plus the last JSON body.
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
    last_body: Arc<Mutex<Option<Value>>>,
}

impl Recorder {
    fn record(&self, call: String, body: Option<Value>) {
        self.calls.lock().push(call);
        if body.is_some() {
            *self.last_body.lock() = body;
        }
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("x-api-key").and_then(|v| v.to_str().ok()) == Some(API_KEY)
}

fn project() -> Value {
    json!({"id": PROJECT_ID, "name": "Client", "identifier": "CLT", "network": 2})
}

fn issues() -> Value {
    json!([
        {
            "id": ISSUE_ID,
            "name": "Fix login",
            "sequence_id": 37,
            "priority": "high",
            "state": "s-progress",
            "state_detail": {"id": "s-progress", "name": "In Progress"},
            "assignees": ["u-1"],
            "labels": []
        },
        {
            "id": "33333333-3333-4333-8333-333333333333",
            "name": "Write docs",
            "sequence_id": 38,
            "priority": "none",
            "state": "s-todo",
            "assignees": [],
            "labels": ["l-docs"]
        }
    ])
}

async fn list_projects(State(rec): State<Recorder>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    rec.record("GET projects".to_string(), None);
    // Paginated shape
    Json(json!({"results": [project()], "count": 1})).into_response()
}

async fn create_project(State(rec): State<Recorder>, Json(body): Json<Value>) -> Response {
    rec.record("POST projects".to_string(), Some(body.clone()));
    (
        StatusCode::CREATED,
        Json(json!({
            "id": "p-new",
            "name": body["name"],
            "identifier": body["identifier"]
        })),
    )
        .into_response()
}

async fn get_project(State(rec): State<Recorder>, Path((_, id)): Path<(String, String)>) -> Response {
    rec.record(format!("GET project {}", id), None);
    if id == PROJECT_ID {
        Json(project()).into_response()
    } else {
        (StatusCode::NOT_FOUND, "not found").into_response()
    }
}

async fn delete_project(
    State(rec): State<Recorder>,
    Path((_, id)): Path<(String, String)>,
) -> StatusCode {
    rec.record(format!("DELETE project {}", id), None);
    StatusCode::FORBIDDEN
}

async fn list_issues(
    State(rec): State<Recorder>,
    Path((_, id)): Path<(String, String)>,
) -> Json<Value> {
    rec.record(format!("GET issues {}", id), None);
    // Bare array shape
    Json(issues())
}

async fn update_issue(
    State(rec): State<Recorder>,
    Path((_, project, issue)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Json<Value> {
    rec.record(format!("PATCH issue {} {}", project, issue), Some(body.clone()));
    let mut updated = issues()[0].clone();
    if let Some(name) = body.get("name") {
        updated["name"] = name.clone();
    }
    Json(updated)
}

async fn spawn_fake_plane() -> (String, Recorder) {
    let recorder = Recorder::default();
    let app = Router::new()
        .route(
            "/api/v1/workspaces/{slug}/projects/",
            get(list_projects).post(create_project),
        )
        .route(
            "/api/v1/workspaces/{slug}/projects/{id}/",
            get(get_project).delete(delete_project),
        )
        .route(
            "/api/v1/workspaces/{slug}/projects/{id}/issues/",
            get(list_issues),
        )
        .route(
            "/api/v1/workspaces/{slug}/projects/{id}/issues/{issue}/",
            axum::routing::patch(update_issue),
        )
        .with_state(recorder.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/api/v1", addr), recorder)
}

async fn tools_with_key(api_key: &str) -> (PlaneTools, Recorder) {
    let (base_url, recorder) = spawn_fake_plane().await;
    let client = PlaneClient::new(PlaneSettings {
        base_url,
        api_key: api_key.to_string(),
        workspace_slug: "acme".to_string(),
    })
    .unwrap();
    (PlaneTools::new(client), recorder)
}

async fn call(tools: &PlaneTools, name: &str, arguments: Value) -> CallToolResult {
    tools
        .call(ToolCall {
            name: name.to_string(),
            arguments: Some(arguments),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_list_projects() {
    let (tools, _) = tools_with_key(API_KEY).await;
    let result = call(&tools, "list_projects", json!({})).await;
    assert!(!result.is_error);
    assert_eq!(
        result.joined_text(),
        format!("Projects:\nClient (ID: {})", PROJECT_ID)
    );
}

#[tokio::test]
async fn test_api_error_becomes_tool_error() {
    let (tools, _) = tools_with_key("wrong-key").await;
    let result = call(&tools, "list_projects", json!({})).await;
    assert!(result.is_error);
    assert_eq!(
        result.joined_text(),
        "Error: API request failed with status code 401"
    );
}

#[tokio::test]
async fn test_create_project_defaults_to_public() {
    let (tools, recorder) = tools_with_key(API_KEY).await;
    let result = call(
        &tools,
        "create_project",
        json!({"name": "Website", "identifier": "WEB"}),
    )
    .await;
    assert_eq!(result.joined_text(), "Project created: Website (WEB)");

    let body = recorder.last_body.lock().clone().unwrap();
    assert_eq!(body["network"], 2);
    assert_eq!(body["description"], "");
}

#[tokio::test]
async fn test_delete_project_requires_confirmation() {
    let (tools, recorder) = tools_with_key(API_KEY).await;
    let result = call(
        &tools,
        "delete_project",
        json!({"project_id": PROJECT_ID, "confirm": false}),
    )
    .await;
    assert!(result.is_error);
    assert!(result.joined_text().contains("confirm"));
    assert!(recorder.calls.lock().is_empty());

    let result = call(
        &tools,
        "delete_project",
        json!({"project_id": PROJECT_ID, "confirm": true}),
    )
    .await;
    assert!(result.is_error);
    assert_eq!(
        result.joined_text(),
        "Error: Permission denied to delete project"
    );
}

#[tokio::test]
async fn test_list_issues_with_filters() {
    let (tools, _) = tools_with_key(API_KEY).await;

    let all = call(&tools, "list_issues", json!({"project_id": PROJECT_ID})).await;
    assert_eq!(
        all.joined_text(),
        "Issues in Client:\n37. Fix login - High Priority - In Progress\n38. Write docs - Unknown State"
    );

    let labelled = call(
        &tools,
        "list_issues",
        json!({"project_id": PROJECT_ID, "label_id": "l-docs"}),
    )
    .await;
    assert_eq!(
        labelled.joined_text(),
        "Issues in Client:\n38. Write docs - Unknown State"
    );

    let none = call(
        &tools,
        "list_issues",
        json!({"project_id": PROJECT_ID, "priority": "urgent"}),
    )
    .await;
    assert_eq!(none.joined_text(), "No issues match the specified filters");

    let missing = call(&tools, "list_issues", json!({"project_id": "nope"})).await;
    assert!(missing.is_error);
    assert_eq!(
        missing.joined_text(),
        "Error: Failed to get project details - 404"
    );
}

#[tokio::test]
async fn test_get_issue_id_resolves_code() {
    let (tools, _) = tools_with_key(API_KEY).await;

    let result = call(&tools, "get_issue_id", json!({"issue_code": "clt-37"})).await;
    assert!(!result.is_error, "{}", result.joined_text());
    let lookup: Value = serde_json::from_str(&result.joined_text()).unwrap();
    assert_eq!(lookup["issue_id"], ISSUE_ID);
    assert_eq!(lookup["project_id"], PROJECT_ID);
    assert_eq!(lookup["name"], "Fix login");
    assert_eq!(lookup["current_state"], "s-progress");

    let unknown = call(&tools, "get_issue_id", json!({"issue_code": "CLT-99"})).await;
    assert!(unknown.is_error);
    assert_eq!(
        unknown.joined_text(),
        "Error: No issue found with sequence ID 99 in project CLT"
    );

    let malformed = call(&tools, "get_issue_id", json!({"issue_code": "37"})).await;
    assert!(malformed.is_error);
}

#[tokio::test]
async fn test_update_issue_by_code() {
    let (tools, recorder) = tools_with_key(API_KEY).await;

    let result = call(
        &tools,
        "update_issue",
        json!({
            "project_id": "ignored",
            "issue_id": "CLT-37",
            "name": "Fix login for SSO",
            "priority": "urgent"
        }),
    )
    .await;
    assert!(!result.is_error, "{}", result.joined_text());
    assert_eq!(
        result.joined_text(),
        "Issue updated: Fix login for SSO (#37) - title updated, priority set to urgent"
    );

    let calls = recorder.calls.lock().clone();
    assert_eq!(
        calls.last().unwrap(),
        &format!("PATCH issue {} {}", PROJECT_ID, ISSUE_ID)
    );
}

#[tokio::test]
async fn test_update_issue_without_changes() {
    let (tools, _) = tools_with_key(API_KEY).await;
    let result = call(
        &tools,
        "update_issue",
        json!({"project_id": PROJECT_ID, "issue_id": ISSUE_ID}),
    )
    .await;
    assert!(result.is_error);
    assert_eq!(result.joined_text(), "Error: No update parameters provided");
}

#[tokio::test]
async fn test_unknown_tool_is_a_dispatch_error() {
    let (tools, _) = tools_with_key(API_KEY).await;
    let result = tools
        .call(ToolCall {
            name: "list_cycles".to_string(),
            arguments: None,
        })
        .await;
    assert!(matches!(result, Err(DispatchError::UnknownTool(name)) if name == "list_cycles"));
}
