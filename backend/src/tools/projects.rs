//! Project tools.

use plane_mcp_types::{
    CreateProjectParams, CreateProjectRequest, DeleteProjectParams, UpdateProjectParams,
    UpdateProjectRequest, NETWORK_PUBLIC,
};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::info;

use super::{parse_args, ToolError, ToolResult};
use crate::plane::{PlaneClient, PlaneError};

pub async fn list_projects(client: &PlaneClient) -> ToolResult {
    let projects = client.list_projects().await?;
    if projects.is_empty() {
        return Ok("No projects found".to_string());
    }
    let lines: Vec<String> = projects
        .iter()
        .map(|p| format!("{} (ID: {})", p.name, p.id))
        .collect();
    Ok(format!("Projects:\n{}", lines.join("\n")))
}

pub async fn create_project(client: &PlaneClient, arguments: Option<Value>) -> ToolResult {
    let params: CreateProjectParams = parse_args(arguments)?;
    info!("MCP: Creating project '{}'", params.name);

    let request = CreateProjectRequest {
        name: params.name,
        identifier: params.identifier,
        description: params.description.unwrap_or_default(),
        network: params.network.unwrap_or(NETWORK_PUBLIC),
    };
    let project = client.create_project(&request).await?;
    Ok(format!(
        "Project created: {} ({})",
        project.name, project.identifier
    ))
}

pub async fn update_project(client: &PlaneClient, arguments: Option<Value>) -> ToolResult {
    let params: UpdateProjectParams = parse_args(arguments)?;
    let request = UpdateProjectRequest {
        name: params.name,
        description: params.description,
        network: params.network,
    };
    if request.is_empty() {
        return Err(ToolError::failed("No update parameters provided"));
    }
    info!("MCP: Updating project {}", params.project_id);

    let project = client.update_project(&params.project_id, &request).await?;
    Ok(format!(
        "Project updated: {} ({})",
        project.name, project.identifier
    ))
}

pub async fn delete_project(client: &PlaneClient, arguments: Option<Value>) -> ToolResult {
    let params: DeleteProjectParams = parse_args(arguments)?;
    if !params.confirm {
        return Err(ToolError::failed(
            "Please confirm deletion by setting 'confirm': true",
        ));
    }

    let project = match client.get_project(&params.project_id).await {
        Ok(project) => project,
        Err(PlaneError::Status { status, .. }) => {
            return Err(ToolError::Failed(format!(
                "Project not found or access denied (Status code: {})",
                status.as_u16()
            )))
        }
        Err(e) => return Err(e.into()),
    };

    info!("MCP: Deleting project {} ({})", project.name, project.id);
    match client.delete_project(&params.project_id).await {
        Ok(()) => Ok(format!(
            "Project deleted successfully: {} ({})",
            project.name, project.identifier
        )),
        Err(PlaneError::Status { status, .. }) => Err(ToolError::Failed(match status {
            StatusCode::NOT_FOUND => "Project not found".to_string(),
            StatusCode::FORBIDDEN => "Permission denied to delete project".to_string(),
            other => format!(
                "Failed to delete project (Status code: {})",
                other.as_u16()
            ),
        })),
        Err(e) => Err(e.into()),
    }
}
