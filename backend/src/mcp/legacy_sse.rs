//! Legacy HTTP+SSE transport (protocol 2024-11-05).
//!
//! `GET /sse` opens a stream whose first event names the endpoint to POST
//! to. Responses to those POSTs are delivered on the stream. The session
//! lives exactly as long as its stream.

use futures::stream::{Stream, StreamExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use axum::response::sse::Event;

use super::error::McpError;
use super::handler::{McpHandler, Notifier};
use super::protocol::{InboundBatch, JsonRpcResponse};
use super::sse_stream::{sse_stream, DisconnectGuard, SseFrame, HEARTBEAT_INTERVAL};

/// Path clients POST messages to.
pub const MESSAGES_PATH: &str = "/messages";

struct LegacySession {
    tx: UnboundedSender<SseFrame>,
    request_lock: tokio::sync::Mutex<()>,
}

impl LegacySession {
    fn send(&self, message: serde_json::Value) {
        if self
            .tx
            .send(SseFrame::message(None, message.to_string()))
            .is_err()
        {
            debug!("Legacy SSE client went away before its response");
        }
    }
}

/// Sessions of the legacy SSE transport.
#[derive(Clone)]
pub struct SseSessionManager {
    handler: Arc<McpHandler>,
    sessions: Arc<RwLock<HashMap<String, Arc<LegacySession>>>>,
    heartbeat: Duration,
    shutdown: CancellationToken,
}

impl SseSessionManager {
    pub fn new(handler: Arc<McpHandler>) -> Self {
        Self {
            handler,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            heartbeat: HEARTBEAT_INTERVAL,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    /// Open a session. The returned body starts with the `endpoint` event;
    /// dropping it ends the session.
    pub fn connect(&self) -> (String, impl Stream<Item = Result<Event, Infallible>> + Send + 'static) {
        let session_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        let endpoint = SseFrame {
            event_id: None,
            event: "endpoint".to_string(),
            data: format!("{}?sessionId={}", MESSAGES_PATH, session_id),
        };
        // The receiver is alive, this cannot fail
        let _ = tx.send(endpoint);

        {
            let mut sessions = self.sessions.write();
            sessions.insert(
                session_id.clone(),
                Arc::new(LegacySession {
                    tx,
                    request_lock: tokio::sync::Mutex::new(()),
                }),
            );
            info!(
                "Legacy SSE session {} connected (total: {})",
                session_id,
                sessions.len()
            );
        }

        let sessions = Arc::clone(&self.sessions);
        let id = session_id.clone();
        let guard = DisconnectGuard::new(move || {
            if sessions.write().remove(&id).is_some() {
                info!("Legacy SSE session {} disconnected", id);
            }
        });

        let body = sse_stream(
            UnboundedReceiverStream::new(rx).boxed(),
            self.heartbeat,
            self.shutdown.clone(),
            guard,
        );
        (session_id, body)
    }

    /// Accept a message for a session. Responses go out on its stream.
    pub fn post(&self, session_id: &str, batch: InboundBatch) -> Result<(), McpError> {
        let session = self
            .sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or(McpError::SessionNotFound)?;
        let handler = Arc::clone(&self.handler);
        let is_batch = batch.is_batch;
        let requests = batch.into_requests();

        tokio::spawn(async move {
            let _guard = session.request_lock.lock().await;
            let sink = Arc::clone(&session);
            let notifier = Notifier::new(move |notification| sink.send(notification.into_value()));

            let mut responses = Vec::new();
            for request in requests {
                let id = request.id.clone();
                let is_notification = request.is_notification();
                match handler.handle_request(request, &notifier).await {
                    Ok(Some(response)) => responses.push(response.into_value()),
                    Ok(None) => {}
                    Err(e) => {
                        error!("MCP: Request failed: {:#}", anyhow::Error::new(e));
                        if !is_notification {
                            responses.push(JsonRpcResponse::internal_error(id).into_value());
                        }
                    }
                }
            }

            if is_batch {
                if !responses.is_empty() {
                    session.send(serde_json::Value::Array(responses));
                }
            } else {
                for response in responses {
                    session.send(response);
                }
            }
        });
        Ok(())
    }

    /// End every stream and forget all sessions.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let count = {
            let mut sessions = self.sessions.write();
            let count = sessions.len();
            sessions.clear();
            count
        };
        if count > 0 {
            info!("Closed {} legacy SSE sessions", count);
        }
    }
}
