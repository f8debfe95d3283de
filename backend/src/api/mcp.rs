//! MCP Streamable HTTP endpoint handlers.
//!
//! Implements the MCP 2025-03-26 Streamable HTTP transport.
//!
//! ## Endpoints
//!
//! - `POST /mcp` - Send JSON-RPC requests (returns JSON or SSE)
//! - `GET /mcp` - Open or resume an SSE stream
//! - `DELETE /mcp` - Terminate a session

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{sse::Sse, IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::mcp::protocol::InboundBatch;
use crate::mcp::transport::{PostOutcome, ResponseMode};
use crate::mcp::{McpError, StreamTransport};
use crate::state::AppState;

/// Header name for MCP session ID.
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

const LAST_EVENT_ID_HEADER: &str = "last-event-id";
const EVENT_STREAM: &str = "text/event-stream";
const APPLICATION_JSON: &str = "application/json";

/// Extract session ID from headers.
fn get_session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(MCP_SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Does the Accept header admit `media_type`? A missing header accepts anything.
fn accepts(headers: &HeaderMap, media_type: &str) -> bool {
    let Some(accept) = header_str(headers, header::ACCEPT) else {
        return true;
    };
    let (family, _) = media_type.split_once('/').unwrap_or((media_type, ""));
    accept.split(',').any(|entry| {
        let range = entry.split(';').next().unwrap_or("").trim();
        range == media_type || range == "*/*" || range == format!("{}/*", family)
    })
}

/// Request bodies must be JSON.
pub(crate) fn require_json_body(headers: &HeaderMap) -> Result<(), McpError> {
    let is_json = header_str(headers, header::CONTENT_TYPE)
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(APPLICATION_JSON));
    if is_json {
        Ok(())
    } else {
        Err(McpError::UnsupportedMediaType)
    }
}

/// Pick JSON or SSE for a POST. SSE is preferred when the client lists it.
fn response_mode(headers: &HeaderMap) -> Result<ResponseMode, McpError> {
    let explicit_sse = header_str(headers, header::ACCEPT)
        .is_some_and(|accept| accept.contains(EVENT_STREAM));
    if explicit_sse {
        Ok(ResponseMode::Sse)
    } else if accepts(headers, APPLICATION_JSON) {
        Ok(ResponseMode::Json)
    } else {
        Err(McpError::NotAcceptable(
            "Client must accept application/json or text/event-stream",
        ))
    }
}

fn with_session_header(mut response: Response, session_id: &str) -> Response {
    if let Ok(hv) = HeaderValue::from_str(session_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(MCP_SESSION_ID_HEADER), hv);
    }
    response
}

/// Find the transport for a POST: an existing session, or a fresh one when
/// the body is an initialization request without a session header.
fn route_post(
    state: &AppState,
    session_id: Option<&str>,
    batch: &InboundBatch,
) -> Result<Arc<StreamTransport>, McpError> {
    match session_id {
        Some(id) => state.mcp().sessions().get(id).ok_or(McpError::NoValidSession),
        None if batch.is_initialize() => {
            if state.mcp().is_shut_down() {
                return Err(McpError::Internal(anyhow::anyhow!(
                    "initialize received after shutdown"
                )));
            }
            Ok(state.mcp().create_transport())
        }
        None => Err(McpError::NoValidSession),
    }
}

/// POST /mcp - Handle JSON-RPC requests.
///
/// Returns `application/json`, or `text/event-stream` when the client accepts
/// it. The `Mcp-Session-Id` header is assigned on initialize and required
/// for subsequent requests.
pub async fn mcp_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, McpError> {
    let mode = response_mode(&headers)?;
    require_json_body(&headers)?;

    let batch = InboundBatch::parse(&body)?;
    let session_id = get_session_id(&headers);
    debug!(
        "MCP POST: {} message(s), session={:?}",
        batch.messages.len(),
        session_id
    );

    let transport = route_post(&state, session_id.as_deref(), &batch)?;
    let outcome = transport.handle_post(batch, mode).await?;

    let response = match outcome {
        PostOutcome::Accepted => StatusCode::ACCEPTED.into_response(),
        PostOutcome::Json(value) => (StatusCode::OK, Json(value)).into_response(),
        PostOutcome::Stream(attached) => Sse::new(transport.sse_body(attached)).into_response(),
    };

    if transport.is_active() {
        Ok(with_session_header(response, transport.session_id()))
    } else {
        Ok(response)
    }
}

/// GET /mcp - Open an SSE stream for server-initiated messages.
///
/// With `Last-Event-ID` the buffered events after that id are replayed and
/// the stream continues live; without it the session's standalone stream is
/// opened.
pub async fn mcp_get(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, McpError> {
    if !header_str(&headers, header::ACCEPT).is_some_and(|accept| accept.contains(EVENT_STREAM)) {
        return Err(McpError::NotAcceptable("Client must accept text/event-stream"));
    }

    let transport = get_session_id(&headers)
        .and_then(|id| state.mcp().sessions().get(&id))
        .ok_or(McpError::SessionIdRequired)?;

    let attached = match header_str(&headers, LAST_EVENT_ID_HEADER) {
        Some(last_event_id) => {
            info!(
                "MCP: Resuming stream for session {} after {}",
                transport.session_id(),
                last_event_id
            );
            transport.resume(last_event_id).await?
        }
        None => {
            let attached = transport.open_standalone()?;
            info!("MCP: SSE stream opened for session {}", transport.session_id());
            attached
        }
    };

    let response = Sse::new(transport.sse_body(attached)).into_response();
    Ok(with_session_header(response, transport.session_id()))
}

/// DELETE /mcp - Terminate a session.
pub async fn mcp_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, McpError> {
    let transport = get_session_id(&headers)
        .and_then(|id| state.mcp().sessions().get(&id))
        .ok_or(McpError::SessionNotFound)?;

    transport.close();
    info!("MCP: Session terminated: {}", transport.session_id());
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_response_mode_negotiation() {
        let both = headers(&[(header::ACCEPT, "application/json, text/event-stream")]);
        assert_eq!(response_mode(&both).unwrap(), ResponseMode::Sse);

        let json = headers(&[(header::ACCEPT, "application/json")]);
        assert_eq!(response_mode(&json).unwrap(), ResponseMode::Json);

        let wildcard = headers(&[(header::ACCEPT, "*/*")]);
        assert_eq!(response_mode(&wildcard).unwrap(), ResponseMode::Json);

        assert_eq!(response_mode(&HeaderMap::new()).unwrap(), ResponseMode::Json);

        let html = headers(&[(header::ACCEPT, "text/html")]);
        assert!(matches!(response_mode(&html), Err(McpError::NotAcceptable(_))));
    }

    #[test]
    fn test_content_type_must_be_json() {
        let ok = headers(&[(header::CONTENT_TYPE, "application/json; charset=utf-8")]);
        assert!(require_json_body(&ok).is_ok());

        let text = headers(&[(header::CONTENT_TYPE, "text/plain")]);
        assert!(matches!(
            require_json_body(&text),
            Err(McpError::UnsupportedMediaType)
        ));
        assert!(require_json_body(&HeaderMap::new()).is_err());
    }

    #[test]
    fn test_blank_session_header_is_ignored() {
        let mut map = HeaderMap::new();
        map.insert(MCP_SESSION_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(get_session_id(&map), None);
    }
}
