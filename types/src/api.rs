//! API request and response types.

use crate::issue::Priority;
use serde::{Deserialize, Serialize};

#[cfg(feature = "validation")]
use garde::Validate;

// ============================================================================
// Plane REST payloads
// ============================================================================

/// List endpoints answer either with a bare array or a paginated envelope,
/// depending on the Plane version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    Paginated { results: Vec<T> },
    Plain(Vec<T>),
}

impl<T> ListResponse<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            ListResponse::Paginated { results } => results,
            ListResponse::Plain(items) => items,
        }
    }
}

/// Body of `POST /workspaces/{slug}/projects/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub identifier: String,
    pub description: String,
    pub network: u8,
}

/// Body of `PATCH /workspaces/{slug}/projects/{id}/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProjectRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<u8>,
}

impl UpdateProjectRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.network.is_none()
    }
}

/// Body of `POST /workspaces/{slug}/projects/{id}/issues/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIssueRequest {
    pub name: String,
    pub description: String,
    pub description_html: String,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<String>,
}

/// Body of `PATCH /workspaces/{slug}/projects/{id}/issues/{issue_id}/`.
///
/// Only the fields that are set are sent, so Plane leaves the rest untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateIssueRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<String>,
}

impl UpdateIssueRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.state_id.is_none()
            && self.assignee_ids.is_none()
            && self.label_ids.is_none()
            && self.start_date.is_none()
            && self.target_date.is_none()
    }
}

// ============================================================================
// Tool arguments
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct CreateProjectParams {
    #[cfg_attr(feature = "validation", garde(length(min = 1)))]
    pub name: String,
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 12)))]
    pub identifier: String,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub description: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(range(max = 2)))]
    pub network: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct UpdateProjectParams {
    #[cfg_attr(feature = "validation", garde(length(min = 1)))]
    pub project_id: String,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(length(min = 1)))]
    pub name: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub description: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(range(max = 2)))]
    pub network: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct DeleteProjectParams {
    #[cfg_attr(feature = "validation", garde(length(min = 1)))]
    pub project_id: String,
    /// Must be `true`; deletion is irreversible.
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub confirm: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct ListIssuesParams {
    #[cfg_attr(feature = "validation", garde(length(min = 1)))]
    pub project_id: String,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub state_id: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub priority: Option<Priority>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub assignee_id: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub label_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct CreateIssueParams {
    #[cfg_attr(feature = "validation", garde(length(min = 1)))]
    pub project_id: String,
    #[cfg_attr(feature = "validation", garde(length(min = 1)))]
    pub name: String,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub description: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub priority: Option<Priority>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub state_id: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub assignee_ids: Option<Vec<String>>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub label_ids: Option<Vec<String>>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(length(min = 10, max = 10)))]
    pub start_date: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(length(min = 10, max = 10)))]
    pub target_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct UpdateIssueParams {
    #[cfg_attr(feature = "validation", garde(length(min = 1)))]
    pub project_id: String,
    /// Issue UUID, or a display code such as `CLT-37`
    #[cfg_attr(feature = "validation", garde(length(min = 1)))]
    pub issue_id: String,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(length(min = 1)))]
    pub name: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub description: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub priority: Option<Priority>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub state_id: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub assignee_ids: Option<Vec<String>>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub label_ids: Option<Vec<String>>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(length(min = 10, max = 10)))]
    pub start_date: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(length(min = 10, max = 10)))]
    pub target_date: Option<String>,
}

impl UpdateIssueParams {
    /// Build the PATCH body, mirroring a description into `description_html`.
    pub fn to_request(&self) -> UpdateIssueRequest {
        UpdateIssueRequest {
            name: self.name.clone(),
            description: self.description.clone(),
            description_html: self.description.as_ref().map(|d| format!("<p>{d}</p>")),
            priority: self.priority,
            state_id: self.state_id.clone(),
            assignee_ids: self.assignee_ids.clone(),
            label_ids: self.label_ids.clone(),
            start_date: self.start_date.clone(),
            target_date: self.target_date.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct DeleteIssueParams {
    #[cfg_attr(feature = "validation", garde(length(min = 1)))]
    pub project_id: String,
    #[cfg_attr(feature = "validation", garde(length(min = 1)))]
    pub issue_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct GetIssueIdParams {
    /// Display code such as `CLT-37`
    #[cfg_attr(feature = "validation", garde(length(min = 3)))]
    pub issue_code: String,
}

/// Result payload of `get_issue_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssueLookup {
    pub issue_id: String,
    pub project_id: String,
    pub name: String,
    pub current_state: Option<String>,
}
