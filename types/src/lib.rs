//! Shared types for the Plane MCP server.
//!
//! This crate contains the Plane domain models, REST payloads and tool
//! argument types shared between the REST client and the tool handlers.

/// Default port for the HTTP transports.
pub const DEFAULT_PORT: u16 = 3000;

pub mod api;
pub mod issue;
pub mod project;

// Re-export commonly used types
pub use api::{
    CreateIssueParams, CreateIssueRequest, CreateProjectParams, CreateProjectRequest,
    DeleteIssueParams, DeleteProjectParams, GetIssueIdParams, IssueLookup, ListIssuesParams,
    ListResponse, UpdateIssueParams, UpdateIssueRequest, UpdateProjectParams,
    UpdateProjectRequest,
};
pub use issue::{Issue, IssueCode, Priority, StateDetail};
pub use project::{Project, NETWORK_PRIVATE, NETWORK_PUBLIC};
