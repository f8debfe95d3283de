//! MCP session registry.
//!
//! Maps `Mcp-Session-Id` values to live transports. Transports insert
//! themselves when they become active and remove themselves when they close,
//! through the observer returned by [`SessionRegistry::observer`].

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::transport::{StreamTransport, TransportEvent, TransportObserver};

/// Registry of active MCP sessions.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<StreamTransport>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport under its session id.
    ///
    /// Returns false if the id is already taken.
    pub fn insert(&self, transport: Arc<StreamTransport>) -> bool {
        let mut sessions = self.sessions.write();
        let id = transport.session_id().to_string();
        if sessions.contains_key(&id) {
            return false;
        }
        sessions.insert(id.clone(), transport);
        info!("Created MCP session: {} (total: {})", id, sessions.len());
        true
    }

    /// Look up an active session.
    pub fn get(&self, id: &str) -> Option<Arc<StreamTransport>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<StreamTransport>> {
        let removed = self.sessions.write().remove(id);
        if removed.is_some() {
            info!("Terminated MCP session: {}", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every transport; each removes itself on close.
    pub fn close_all(&self) -> usize {
        let transports: Vec<_> = self.sessions.read().values().cloned().collect();
        let mut closed = 0;
        for transport in transports {
            if transport.close() {
                closed += 1;
            }
        }
        // Transports that closed before observing us are dropped here
        self.sessions.write().clear();
        closed
    }

    /// Lifecycle observer wiring a transport to this registry.
    pub fn observer(&self) -> TransportObserver {
        let registry = self.clone();
        Arc::new(move |transport, event| match event {
            TransportEvent::Initialized { session_id } => {
                if !registry.insert(Arc::clone(transport)) {
                    debug!("MCP session {} already registered", session_id);
                }
            }
            TransportEvent::Closed { session_id } => {
                registry.remove(session_id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::event_store::InMemoryEventStore;
    use crate::mcp::handler::tests::echo_handler;
    use crate::mcp::sse_stream::HEARTBEAT_INTERVAL;

    fn observed_transport(registry: &SessionRegistry) -> Arc<StreamTransport> {
        let transport = StreamTransport::new(
            Arc::new(echo_handler()),
            Arc::new(InMemoryEventStore::new()),
            HEARTBEAT_INTERVAL,
        );
        transport.observe(registry.observer());
        transport
    }

    #[tokio::test]
    async fn test_registry_follows_transport_lifecycle() {
        let registry = SessionRegistry::new();
        let transport = observed_transport(&registry);
        let id = transport.session_id().to_string();
        assert!(registry.get(&id).is_none());

        transport.activate().unwrap();
        assert!(registry.get(&id).is_some());
        assert_eq!(registry.len(), 1);

        transport.close();
        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_close_all_closes_transports() {
        let registry = SessionRegistry::new();
        let a = observed_transport(&registry);
        let b = observed_transport(&registry);
        a.activate().unwrap();
        b.activate().unwrap();

        assert_eq!(registry.close_all(), 2);
        assert!(registry.is_empty());
        assert!(!a.is_active());
        assert!(!b.is_active());
        assert_eq!(registry.close_all(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_transport_never_registered() {
        let registry = SessionRegistry::new();
        let transport = observed_transport(&registry);
        assert!(transport.close());
        assert!(registry.is_empty());
    }
}
