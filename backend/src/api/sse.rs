//! Legacy HTTP+SSE endpoints (protocol 2024-11-05).

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, Sse},
};
use futures::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use tracing::{debug, info};

use super::mcp::require_json_body;
use crate::mcp::protocol::InboundBatch;
use crate::mcp::McpError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// GET /sse - Open a session.
///
/// The first event is `endpoint`, naming the URL to POST messages to.
/// Closing the connection ends the session.
pub async fn sse_connect(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (session_id, body) = state.legacy().connect();
    info!(
        "New legacy SSE client connected: {} (total: {})",
        session_id,
        state.legacy().len()
    );
    Sse::new(body)
}

/// POST /messages?sessionId=<id> - Deliver a message to a session.
///
/// Answers 202 at once; the JSON-RPC response arrives on the session's stream.
pub async fn post_message(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), McpError> {
    let session_id = query
        .session_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| McpError::InvalidRequest("sessionId query parameter is required".into()))?;
    require_json_body(&headers)?;

    let batch = InboundBatch::parse(&body)?;
    debug!(
        "Legacy SSE POST: {} message(s), session={}",
        batch.messages.len(),
        session_id
    );
    state.legacy().post(&session_id, batch)?;
    Ok((StatusCode::ACCEPTED, "Accepted"))
}
