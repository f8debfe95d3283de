//! MCP tools backed by the Plane REST API.
//!
//! Every tool answers with text. Failures (bad arguments, API errors) come
//! back as tool results flagged `isError` with an `Error: ...` message so the
//! calling model can read them; only a bug in the server itself surfaces as a
//! protocol error.

use async_trait::async_trait;
use garde::Validate;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::mcp::{CallToolResult, DispatchError, ToolCall, ToolDescriptor, ToolDispatcher};
use crate::plane::{PlaneClient, PlaneError};

pub mod issues;
pub mod projects;

/// The fixed set of tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    ListProjects,
    CreateProject,
    UpdateProject,
    DeleteProject,
    ListIssues,
    CreateIssue,
    UpdateIssue,
    DeleteIssue,
    GetIssueId,
}

impl ToolName {
    pub const ALL: [ToolName; 9] = [
        ToolName::ListProjects,
        ToolName::CreateProject,
        ToolName::UpdateProject,
        ToolName::DeleteProject,
        ToolName::ListIssues,
        ToolName::CreateIssue,
        ToolName::UpdateIssue,
        ToolName::DeleteIssue,
        ToolName::GetIssueId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::ListProjects => "list_projects",
            ToolName::CreateProject => "create_project",
            ToolName::UpdateProject => "update_project",
            ToolName::DeleteProject => "delete_project",
            ToolName::ListIssues => "list_issues",
            ToolName::CreateIssue => "create_issue",
            ToolName::UpdateIssue => "update_issue",
            ToolName::DeleteIssue => "delete_issue",
            ToolName::GetIssueId => "get_issue_id",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolName::ListProjects => "List all projects in the Plane workspace",
            ToolName::CreateProject => "Create a new project in Plane",
            ToolName::UpdateProject => "Update the name, description or visibility of a project",
            ToolName::DeleteProject => {
                "Delete a project. Requires confirm: true; this cannot be undone"
            }
            ToolName::ListIssues => {
                "List issues in a project, optionally filtered by state, priority, assignee or label"
            }
            ToolName::CreateIssue => "Create a new issue in a project",
            ToolName::UpdateIssue => {
                "Update an existing issue. issue_id may be a UUID or an issue code such as CLT-37"
            }
            ToolName::DeleteIssue => "Delete an issue from a project",
            ToolName::GetIssueId => {
                "Resolve an issue code such as CLT-37 to the issue's UUID and project"
            }
        }
    }

    pub fn input_schema(&self) -> Value {
        let priority = json!({
            "type": "string",
            "enum": ["none", "low", "medium", "high", "urgent"],
            "description": "Issue priority"
        });
        let date = |what: &str| {
            json!({
                "type": "string",
                "description": format!("{} date (YYYY-MM-DD)", what)
            })
        };
        let ids = |what: &str| {
            json!({
                "type": "array",
                "items": {"type": "string"},
                "description": format!("UUIDs of {}", what)
            })
        };
        let string = |description: &str| json!({"type": "string", "description": description});

        match self {
            ToolName::ListProjects => json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            ToolName::CreateProject => json!({
                "type": "object",
                "properties": {
                    "name": string("Project name"),
                    "identifier": string("Short uppercase project code, e.g. PROJ"),
                    "description": string("Project description"),
                    "network": {
                        "type": "integer",
                        "enum": [0, 2],
                        "description": "0 for private, 2 for public (default)"
                    }
                },
                "required": ["name", "identifier"]
            }),
            ToolName::UpdateProject => json!({
                "type": "object",
                "properties": {
                    "project_id": string("The UUID of the project"),
                    "name": string("New project name"),
                    "description": string("New project description"),
                    "network": {
                        "type": "integer",
                        "enum": [0, 2],
                        "description": "0 for private, 2 for public"
                    }
                },
                "required": ["project_id"]
            }),
            ToolName::DeleteProject => json!({
                "type": "object",
                "properties": {
                    "project_id": string("The UUID of the project to delete"),
                    "confirm": {
                        "type": "boolean",
                        "description": "Must be true to confirm deletion"
                    }
                },
                "required": ["project_id", "confirm"]
            }),
            ToolName::ListIssues => json!({
                "type": "object",
                "properties": {
                    "project_id": string("The UUID of the project"),
                    "state_id": string("Only issues in this state"),
                    "priority": priority,
                    "assignee_id": string("Only issues assigned to this user"),
                    "label_id": string("Only issues with this label")
                },
                "required": ["project_id"]
            }),
            ToolName::CreateIssue => json!({
                "type": "object",
                "properties": {
                    "project_id": string("The UUID of the project"),
                    "name": string("Issue title"),
                    "description": string("Issue description"),
                    "priority": priority,
                    "state_id": string("UUID of the initial state"),
                    "assignee_ids": ids("assignees"),
                    "label_ids": ids("labels"),
                    "start_date": date("Start"),
                    "target_date": date("Target")
                },
                "required": ["project_id", "name"]
            }),
            ToolName::UpdateIssue => json!({
                "type": "object",
                "properties": {
                    "project_id": string("The UUID of the project"),
                    "issue_id": string("The UUID of the issue, or its code such as CLT-37"),
                    "name": string("New title"),
                    "description": string("New description"),
                    "priority": priority,
                    "state_id": string("UUID of the new state"),
                    "assignee_ids": ids("assignees"),
                    "label_ids": ids("labels"),
                    "start_date": date("Start"),
                    "target_date": date("Target")
                },
                "required": ["project_id", "issue_id"]
            }),
            ToolName::DeleteIssue => json!({
                "type": "object",
                "properties": {
                    "project_id": string("The UUID of the project"),
                    "issue_id": string("The UUID of the issue to delete")
                },
                "required": ["project_id", "issue_id"]
            }),
            ToolName::GetIssueId => json!({
                "type": "object",
                "properties": {
                    "issue_code": string("Issue code in PROJECT_CODE-NUMBER form, e.g. CLT-37")
                },
                "required": ["issue_code"]
            }),
        }
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.as_str().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Why a tool call failed. Rendered to the model as `Error: <message>`.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments - {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Plane(#[from] PlaneError),

    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    pub fn failed(message: impl Into<String>) -> Self {
        ToolError::Failed(message.into())
    }
}

pub type ToolResult = Result<String, ToolError>;

/// Deserialize and validate tool arguments. Missing arguments are treated
/// as an empty object.
pub fn parse_args<T>(arguments: Option<Value>) -> Result<T, ToolError>
where
    T: DeserializeOwned + Validate,
    T::Context: Default,
{
    let value = arguments.unwrap_or_else(|| json!({}));
    let params: T =
        serde_json::from_value(value).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
    params
        .validate()
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
    Ok(params)
}

/// Dispatches tool calls to the Plane API.
#[derive(Clone)]
pub struct PlaneTools {
    client: PlaneClient,
}

impl PlaneTools {
    pub fn new(client: PlaneClient) -> Self {
        Self { client }
    }

    async fn run(&self, tool: ToolName, arguments: Option<Value>) -> ToolResult {
        let client = &self.client;
        match tool {
            ToolName::ListProjects => projects::list_projects(client).await,
            ToolName::CreateProject => projects::create_project(client, arguments).await,
            ToolName::UpdateProject => projects::update_project(client, arguments).await,
            ToolName::DeleteProject => projects::delete_project(client, arguments).await,
            ToolName::ListIssues => issues::list_issues(client, arguments).await,
            ToolName::CreateIssue => issues::create_issue(client, arguments).await,
            ToolName::UpdateIssue => issues::update_issue(client, arguments).await,
            ToolName::DeleteIssue => issues::delete_issue(client, arguments).await,
            ToolName::GetIssueId => issues::get_issue_id(client, arguments).await,
        }
    }
}

#[async_trait]
impl ToolDispatcher for PlaneTools {
    fn tools(&self) -> Vec<ToolDescriptor> {
        ToolName::ALL.iter().map(ToolName::descriptor).collect()
    }

    async fn call(&self, call: ToolCall) -> Result<CallToolResult, DispatchError> {
        let Some(tool) = ToolName::from_name(&call.name) else {
            return Err(DispatchError::UnknownTool(call.name));
        };
        info!("MCP: Calling tool {}", tool.as_str());

        Ok(match self.run(tool, call.arguments).await {
            Ok(text) => CallToolResult::text(text),
            Err(e) => {
                warn!("MCP: Tool {} failed: {}", tool.as_str(), e);
                CallToolResult::error(format!("Error: {}", e))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plane_mcp_types::CreateProjectParams;
    use std::collections::HashSet;

    #[test]
    fn test_tool_names_round_trip_and_are_unique() {
        let names: HashSet<_> = ToolName::ALL.iter().map(|t| t.as_str()).collect();
        assert_eq!(names.len(), ToolName::ALL.len());
        for tool in ToolName::ALL {
            assert_eq!(ToolName::from_name(tool.as_str()), Some(tool));
        }
        assert_eq!(ToolName::from_name("list_cycles"), None);
    }

    #[test]
    fn test_schemas_are_objects_with_required_list() {
        for tool in ToolName::ALL {
            let schema = tool.input_schema();
            assert_eq!(schema["type"], "object", "{}", tool.as_str());
            assert!(schema["required"].is_array(), "{}", tool.as_str());
        }
    }

    #[test]
    fn test_parse_args_validates() {
        let ok: CreateProjectParams =
            parse_args(Some(json!({"name": "Web", "identifier": "WEB"}))).unwrap();
        assert_eq!(ok.identifier, "WEB");

        let missing = parse_args::<CreateProjectParams>(None);
        assert!(matches!(missing, Err(ToolError::InvalidArguments(_))));

        let empty = parse_args::<CreateProjectParams>(Some(json!({"name": "", "identifier": "X"})));
        assert!(matches!(empty, Err(ToolError::InvalidArguments(_))));
    }
}
