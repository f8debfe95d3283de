//! Issue tools.

use plane_mcp_types::{
    CreateIssueParams, CreateIssueRequest, DeleteIssueParams, GetIssueIdParams, Issue, IssueCode,
    IssueLookup, ListIssuesParams, Priority, UpdateIssueParams,
};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::{parse_args, ToolError, ToolResult};
use crate::plane::{PlaneClient, PlaneError};

/// One listing line: `<seq>. <name>[ - <Priority> Priority] - <state>`.
fn format_issue(issue: &Issue) -> String {
    let priority = match issue.priority {
        Priority::None => String::new(),
        other => format!(" - {} Priority", other.title()),
    };
    format!(
        "{}. {}{} - {}",
        issue.sequence_id,
        issue.name,
        priority,
        issue.state_name()
    )
}

/// Plane ids are lowercase hyphenated UUIDs. Anything else is treated as an
/// issue code.
fn is_issue_uuid(value: &str) -> bool {
    value.len() == 36
        && !value.bytes().any(|b| b.is_ascii_uppercase())
        && Uuid::try_parse(value).is_ok()
}

fn matches_filters(issue: &Issue, params: &ListIssuesParams) -> bool {
    params
        .state_id
        .as_ref()
        .map_or(true, |state| issue.state.as_ref() == Some(state))
        && params.priority.map_or(true, |p| issue.priority == p)
        && params
            .assignee_id
            .as_ref()
            .map_or(true, |a| issue.assignees.contains(a))
        && params
            .label_id
            .as_ref()
            .map_or(true, |l| issue.labels.contains(l))
}

pub async fn list_issues(client: &PlaneClient, arguments: Option<Value>) -> ToolResult {
    let params: ListIssuesParams = parse_args(arguments)?;

    let project = match client.get_project(&params.project_id).await {
        Ok(project) => project,
        Err(PlaneError::Status { status, .. }) => {
            return Err(ToolError::Failed(format!(
                "Failed to get project details - {}",
                status.as_u16()
            )))
        }
        Err(e) => return Err(e.into()),
    };

    let issues = client.list_issues(&params.project_id).await?;
    if issues.is_empty() {
        return Ok(format!("No issues found in project {}", project.name));
    }

    let lines: Vec<String> = issues
        .iter()
        .filter(|issue| matches_filters(issue, &params))
        .map(format_issue)
        .collect();
    if lines.is_empty() {
        return Ok("No issues match the specified filters".to_string());
    }
    Ok(format!("Issues in {}:\n{}", project.name, lines.join("\n")))
}

pub async fn create_issue(client: &PlaneClient, arguments: Option<Value>) -> ToolResult {
    let params: CreateIssueParams = parse_args(arguments)?;
    info!("MCP: Creating issue '{}'", params.name);

    let description = params.description.unwrap_or_default();
    let request = CreateIssueRequest {
        name: params.name,
        description_html: format!("<p>{}</p>", description),
        description,
        priority: params.priority.unwrap_or_default(),
        state_id: params.state_id,
        assignee_ids: params.assignee_ids,
        label_ids: params.label_ids,
        start_date: params.start_date,
        target_date: params.target_date,
    };
    let issue = client.create_issue(&params.project_id, &request).await?;
    Ok(format!("Issue created: {} (#{})", issue.name, issue.sequence_id))
}

/// Find an issue by display code.
async fn lookup_issue(client: &PlaneClient, issue_code: &str) -> Result<IssueLookup, ToolError> {
    let code = IssueCode::parse(issue_code).ok_or_else(|| {
        ToolError::failed(
            "Invalid issue code format. Expected format: PROJECT_CODE-NUMBER (e.g. CLT-37)",
        )
    })?;

    let projects = client.list_projects().await?;
    let project = projects
        .into_iter()
        .find(|p| p.matches_identifier(&code.project))
        .ok_or_else(|| {
            ToolError::Failed(format!("No project found with identifier {}", code.project))
        })?;

    let issues = client.list_issues(&project.id).await?;
    let issue = issues
        .into_iter()
        .find(|i| i.sequence_id == code.sequence_id)
        .ok_or_else(|| {
            ToolError::Failed(format!(
                "No issue found with sequence ID {} in project {}",
                code.sequence_id, code.project
            ))
        })?;

    debug!("Resolved {} to issue {}", code, issue.id);
    Ok(IssueLookup {
        issue_id: issue.id,
        project_id: project.id,
        name: issue.name,
        current_state: issue.state,
    })
}

pub async fn get_issue_id(client: &PlaneClient, arguments: Option<Value>) -> ToolResult {
    let params: GetIssueIdParams = parse_args(arguments)?;
    let lookup = lookup_issue(client, &params.issue_code).await?;
    serde_json::to_string(&lookup).map_err(|e| ToolError::Failed(e.to_string()))
}

pub async fn update_issue(client: &PlaneClient, arguments: Option<Value>) -> ToolResult {
    let params: UpdateIssueParams = parse_args(arguments)?;

    // Issue codes are resolved to the issue and its owning project
    let (project_id, issue_id) = if is_issue_uuid(&params.issue_id) {
        (params.project_id.clone(), params.issue_id.clone())
    } else {
        let lookup = lookup_issue(client, &params.issue_id).await.map_err(|e| {
            ToolError::Failed(format!(
                "Could not resolve issue code {} to a UUID. Details: Error: {}",
                params.issue_id, e
            ))
        })?;
        (lookup.project_id, lookup.issue_id)
    };

    let request = params.to_request();
    if request.is_empty() {
        return Err(ToolError::failed("No update parameters provided"));
    }
    info!("MCP: Updating issue {}", issue_id);

    let issue = client
        .update_issue(&project_id, &issue_id, &request)
        .await?;

    let mut changes = Vec::new();
    if request.state_id.is_some() {
        changes.push("status changed".to_string());
    }
    if request.name.is_some() {
        changes.push("title updated".to_string());
    }
    if request.description.is_some() {
        changes.push("description updated".to_string());
    }
    if let Some(priority) = request.priority {
        changes.push(format!("priority set to {}", priority));
    }
    if request.assignee_ids.is_some() {
        changes.push("assignees updated".to_string());
    }

    let change_text = if changes.is_empty() {
        String::new()
    } else {
        format!(" - {}", changes.join(", "))
    };
    Ok(format!(
        "Issue updated: {} (#{}){}",
        issue.name, issue.sequence_id, change_text
    ))
}

pub async fn delete_issue(client: &PlaneClient, arguments: Option<Value>) -> ToolResult {
    let params: DeleteIssueParams = parse_args(arguments)?;
    info!("MCP: Deleting issue {}", params.issue_id);
    client
        .delete_issue(&params.project_id, &params.issue_id)
        .await?;
    Ok(format!("Issue deleted: {}", params.issue_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use plane_mcp_types::StateDetail;

    fn issue(seq: u64, priority: Priority, state: Option<&str>) -> Issue {
        Issue {
            id: format!("id-{}", seq),
            name: format!("Issue {}", seq),
            sequence_id: seq,
            priority,
            state: Some("s-todo".to_string()),
            state_detail: state.map(|name| StateDetail {
                id: None,
                name: name.to_string(),
            }),
            assignees: vec!["u1".to_string()],
            labels: vec![],
        }
    }

    fn filters() -> ListIssuesParams {
        ListIssuesParams {
            project_id: "p".to_string(),
            state_id: None,
            priority: None,
            assignee_id: None,
            label_id: None,
        }
    }

    #[test]
    fn test_issue_uuid_must_be_lowercase_hyphenated() {
        assert!(is_issue_uuid("22222222-2222-4222-8222-222222222222"));
        assert!(is_issue_uuid("0f9e8d7c-6b5a-4f3e-9d2c-1b0a9f8e7d6c"));
        assert!(!is_issue_uuid("0F9E8D7C-6B5A-4F3E-9D2C-1B0A9F8E7D6C"));
        assert!(!is_issue_uuid("0f9e8d7c6b5a4f3e9d2c1b0a9f8e7d6c"));
        assert!(!is_issue_uuid("{0f9e8d7c-6b5a-4f3e-9d2c-1b0a9f8e7d6c}"));
        assert!(!is_issue_uuid("urn:uuid:0f9e8d7c-6b5a-4f3e-9d2c-1b0a9f8e7d6c"));
        assert!(!is_issue_uuid("CLT-37"));
    }

    #[test]
    fn test_format_issue_line() {
        assert_eq!(
            format_issue(&issue(3, Priority::High, Some("In Progress"))),
            "3. Issue 3 - High Priority - In Progress"
        );
        assert_eq!(
            format_issue(&issue(4, Priority::None, None)),
            "4. Issue 4 - Unknown State"
        );
    }

    #[test]
    fn test_filters_combine() {
        let high = issue(1, Priority::High, None);
        let mut params = filters();
        assert!(matches_filters(&high, &params));

        params.priority = Some(Priority::Low);
        assert!(!matches_filters(&high, &params));

        params.priority = Some(Priority::High);
        params.assignee_id = Some("u1".to_string());
        assert!(matches_filters(&high, &params));

        params.label_id = Some("bug".to_string());
        assert!(!matches_filters(&high, &params));
    }
}
