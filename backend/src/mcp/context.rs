//! Shared MCP state handed to the router.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::event_store::InMemoryEventStore;
use super::handler::McpHandler;
use super::session::SessionRegistry;
use super::sse_stream::HEARTBEAT_INTERVAL;
use super::transport::StreamTransport;

/// Everything the Streamable HTTP endpoints need. Built explicitly so tests
/// can run independent instances side by side.
#[derive(Clone)]
pub struct McpContext {
    sessions: SessionRegistry,
    events: Arc<InMemoryEventStore>,
    handler: Arc<McpHandler>,
    heartbeat: Duration,
    shut_down: Arc<AtomicBool>,
}

impl McpContext {
    pub fn new(handler: Arc<McpHandler>) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            events: Arc::new(InMemoryEventStore::new()),
            handler,
            heartbeat: HEARTBEAT_INTERVAL,
            shut_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Heartbeat period for every SSE stream opened through this context.
    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// A fresh transport wired to the registry. It is not registered until
    /// it completes initialization.
    pub fn create_transport(&self) -> Arc<StreamTransport> {
        let transport = StreamTransport::new(
            Arc::clone(&self.handler),
            Arc::clone(&self.events),
            self.heartbeat,
        );
        transport.observe(self.sessions.observer());
        transport
    }

    /// Close every session. Only the first call does anything.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let closed = self.sessions.close_all();
        info!("Closed {} MCP sessions", closed);
    }
}
