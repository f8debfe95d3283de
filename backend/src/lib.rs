//! Plane MCP server library.
//!
//! This module exposes the application builder for use in tests.

use axum::http::{header, HeaderName, Method};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod logging;
pub mod mcp;
pub mod plane;
pub mod shutdown;
pub mod state;
pub mod tools;

use config::TransportKind;
use state::AppState;

/// Create the Axum application router.
///
/// Only the routes of the configured transport are mounted; `/health` is
/// always available. Used both by the server binary and by integration tests.
pub fn create_app(state: AppState) -> Router {
    let transport_router = match state.transport() {
        TransportKind::Http => Router::new().route(
            "/mcp",
            post(api::mcp::mcp_post)
                .get(api::mcp::mcp_get)
                .delete(api::mcp::mcp_delete),
        ),
        TransportKind::Sse => Router::new()
            .route("/sse", get(api::sse::sse_connect))
            .route(mcp::legacy_sse::MESSAGES_PATH, post(api::sse::post_message)),
        TransportKind::Stdio => Router::new(),
    };

    let session_header = HeaderName::from_static(api::mcp::MCP_SESSION_ID_HEADER);
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("last-event-id"),
            session_header.clone(),
        ])
        .expose_headers([session_header]);

    Router::new()
        .route("/health", get(api::health::health))
        .merge(transport_router)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
