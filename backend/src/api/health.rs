//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub transport: String,
    pub sessions: usize,
    /// Seconds since startup
    pub uptime: u64,
    pub timestamp: String,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        transport: state.transport().to_string(),
        sessions: state.session_count(),
        uptime: state.uptime().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
