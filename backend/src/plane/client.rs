use plane_mcp_types::{
    CreateIssueRequest, CreateProjectRequest, Issue, ListResponse, Project, UpdateIssueRequest,
    UpdateProjectRequest,
};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Request timeout for Plane API calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum PlaneError {
    #[error("Network error - {0}")]
    Network(#[source] reqwest::Error),

    #[error("API request failed with status code {}", .status.as_u16())]
    Status { status: StatusCode, body: String },

    #[error("Failed to parse response - {0}")]
    Decode(#[source] reqwest::Error),
}

impl PlaneError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            PlaneError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlaneError>;

/// Connection settings for one Plane workspace.
#[derive(Debug, Clone)]
pub struct PlaneSettings {
    pub base_url: String,
    pub api_key: String,
    pub workspace_slug: String,
}

/// HTTP client for the Plane REST API
#[derive(Clone, Debug)]
pub struct PlaneClient {
    base_url: String,
    workspace_slug: String,
    api_key: String,
    client: Client,
}

impl PlaneClient {
    pub fn new(settings: PlaneSettings) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            workspace_slug: settings.workspace_slug,
            api_key: settings.api_key,
            client,
        })
    }

    pub fn workspace_slug(&self) -> &str {
        &self.workspace_slug
    }

    fn projects_url(&self) -> String {
        format!(
            "{}/workspaces/{}/projects/",
            self.base_url, self.workspace_slug
        )
    }

    fn project_url(&self, project_id: &str) -> String {
        format!("{}{}/", self.projects_url(), project_id)
    }

    fn issues_url(&self, project_id: &str) -> String {
        format!("{}issues/", self.project_url(project_id))
    }

    fn issue_url(&self, project_id: &str, issue_id: &str) -> String {
        format!("{}{}/", self.issues_url(project_id), issue_id)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        debug!("Plane API {} {}", method, url);
        self.client
            .request(method, url)
            .header("X-API-Key", &self.api_key)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await.map_err(PlaneError::Network)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!("Plane API error {}: {}", status, body);
        Err(PlaneError::Status { status, body })
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        self.send(builder)
            .await?
            .json()
            .await
            .map_err(PlaneError::Decode)
    }

    async fn with_body<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: &B,
    ) -> Result<T> {
        self.json(self.request(method, url).json(body)).await
    }

    /// List all projects in the workspace
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let list: ListResponse<Project> = self
            .json(self.request(Method::GET, &self.projects_url()))
            .await?;
        Ok(list.into_items())
    }

    /// Get a specific project
    pub async fn get_project(&self, project_id: &str) -> Result<Project> {
        self.json(self.request(Method::GET, &self.project_url(project_id)))
            .await
    }

    /// Create a new project
    pub async fn create_project(&self, request: &CreateProjectRequest) -> Result<Project> {
        self.with_body(Method::POST, &self.projects_url(), request)
            .await
    }

    /// Update a project
    pub async fn update_project(
        &self,
        project_id: &str,
        request: &UpdateProjectRequest,
    ) -> Result<Project> {
        self.with_body(Method::PATCH, &self.project_url(project_id), request)
            .await
    }

    /// Delete a project
    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, &self.project_url(project_id)))
            .await?;
        Ok(())
    }

    /// List the issues of a project
    pub async fn list_issues(&self, project_id: &str) -> Result<Vec<Issue>> {
        let list: ListResponse<Issue> = self
            .json(self.request(Method::GET, &self.issues_url(project_id)))
            .await?;
        Ok(list.into_items())
    }

    /// Create an issue
    pub async fn create_issue(
        &self,
        project_id: &str,
        request: &CreateIssueRequest,
    ) -> Result<Issue> {
        self.with_body(Method::POST, &self.issues_url(project_id), request)
            .await
    }

    /// Update an issue
    pub async fn update_issue(
        &self,
        project_id: &str,
        issue_id: &str,
        request: &UpdateIssueRequest,
    ) -> Result<Issue> {
        self.with_body(
            Method::PATCH,
            &self.issue_url(project_id, issue_id),
            request,
        )
        .await
    }

    /// Delete an issue
    pub async fn delete_issue(&self, project_id: &str, issue_id: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, &self.issue_url(project_id, issue_id)))
            .await?;
        Ok(())
    }
}
