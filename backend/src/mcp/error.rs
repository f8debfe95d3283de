//! Errors surfaced to MCP clients.
//!
//! Every variant maps to an HTTP status and a JSON-RPC error code, so the
//! transports can render them as the same `{jsonrpc, error, id: null}`
//! envelope regardless of where they originated.

use axum::http::StatusCode;
use thiserror::Error;

use super::protocol::{error_codes, JsonRpcResponse};

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid Request: {0}")]
    InvalidRequest(String),

    #[error("Bad Request: No valid session ID provided")]
    NoValidSession,

    #[error("Bad Request: Mcp-Session-Id header is required")]
    SessionIdRequired,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Not Acceptable: {0}")]
    NotAcceptable(&'static str),

    #[error("Unsupported Media Type: Content-Type must be application/json")]
    UnsupportedMediaType,

    #[error("Conflict: Only one SSE stream is allowed per session")]
    StreamConflict,

    /// Details are logged, never sent to the client.
    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl McpError {
    pub fn status(&self) -> StatusCode {
        match self {
            McpError::ParseError(_)
            | McpError::InvalidRequest(_)
            | McpError::NoValidSession
            | McpError::SessionIdRequired => StatusCode::BAD_REQUEST,
            McpError::SessionNotFound => StatusCode::NOT_FOUND,
            McpError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            McpError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            McpError::StreamConflict => StatusCode::CONFLICT,
            McpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            McpError::ParseError(_) => error_codes::PARSE_ERROR,
            McpError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            McpError::SessionNotFound => error_codes::SESSION_NOT_FOUND,
            McpError::Internal(_) => error_codes::INTERNAL_ERROR,
            McpError::NoValidSession
            | McpError::SessionIdRequired
            | McpError::NotAcceptable(_)
            | McpError::UnsupportedMediaType
            | McpError::StreamConflict => error_codes::SERVER_ERROR,
        }
    }

    /// The JSON-RPC envelope for this error. The id is always `null`: the
    /// failure happened before any request could be attributed.
    pub fn to_response(&self) -> JsonRpcResponse {
        JsonRpcResponse::error(None, self.code(), self.to_string())
    }
}
