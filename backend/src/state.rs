//! Application state management.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::TransportKind;
use crate::mcp::{McpContext, McpHandler, SseSessionManager};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Streamable HTTP sessions and their event log
    mcp: McpContext,
    /// Legacy SSE sessions
    legacy: SseSessionManager,
    /// Transport the router was built for
    transport: TransportKind,
    started_at: Instant,
}

impl AppState {
    /// Create new application state around one handler shared by both HTTP
    /// transports.
    pub fn new(handler: Arc<McpHandler>, transport: TransportKind) -> Self {
        Self::from_parts(
            McpContext::new(Arc::clone(&handler)),
            SseSessionManager::new(handler),
            transport,
        )
    }

    /// Assemble state from prebuilt parts, e.g. with a short heartbeat in tests.
    pub fn from_parts(mcp: McpContext, legacy: SseSessionManager, transport: TransportKind) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                mcp,
                legacy,
                transport,
                started_at: Instant::now(),
            }),
        }
    }

    pub fn mcp(&self) -> &McpContext {
        &self.inner.mcp
    }

    pub fn legacy(&self) -> &SseSessionManager {
        &self.inner.legacy
    }

    pub fn transport(&self) -> TransportKind {
        self.inner.transport
    }

    pub fn uptime(&self) -> Duration {
        self.inner.started_at.elapsed()
    }

    /// Live sessions on the active transport.
    pub fn session_count(&self) -> usize {
        match self.inner.transport {
            TransportKind::Sse => self.inner.legacy.len(),
            _ => self.inner.mcp.sessions().len(),
        }
    }

    /// Close every session and end every open stream.
    pub fn shutdown(&self) {
        info!("Shutting down {} transport", self.inner.transport);
        self.inner.mcp.shutdown();
        self.inner.legacy.shutdown();
    }
}
