//! HTTP rendering of MCP errors.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, error};

use crate::mcp::McpError;

impl IntoResponse for McpError {
    fn into_response(self) -> Response {
        match &self {
            McpError::Internal(source) => error!("MCP: Internal error: {:#}", source),
            other => debug!("MCP: Rejecting request: {}", other),
        }
        (self.status(), Json(self.to_response().into_value())).into_response()
    }
}
