//! Per-session Streamable HTTP transport.
//!
//! A [`StreamTransport`] binds one MCP session to the wire. It owns the
//! session's SSE streams, records everything written to them in the shared
//! event store, and serializes request handling for the session.

use axum::response::sse::Event;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::McpError;
use super::event_store::{InMemoryEventStore, StreamId};
use super::handler::{McpHandler, Notifier};
use super::protocol::{InboundBatch, JsonRpcRequest, JsonRpcResponse};
use super::sse_stream::{sse_stream, DisconnectGuard, SseFrame};

/// Lifecycle of a transport. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Uninitialized,
    Active,
    Closed,
}

impl TransportState {
    pub fn can_transition_to(self, to: TransportState) -> bool {
        use TransportState::*;
        matches!(
            (self, to),
            (Uninitialized, Active) | (Uninitialized, Closed) | (Active, Closed)
        )
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Uninitialized => write!(f, "uninitialized"),
            TransportState::Active => write!(f, "active"),
            TransportState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("illegal transport transition from {from} to {to}")]
    Illegal {
        from: TransportState,
        to: TransportState,
    },
}

/// Emitted to observers on successful transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Initialized { session_id: String },
    Closed { session_id: String },
}

pub type TransportObserver = Arc<dyn Fn(&Arc<StreamTransport>, &TransportEvent) + Send + Sync>;

/// How the client wants responses to a POST delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Json,
    Sse,
}

/// A stream with a writer attached, ready to become an SSE body.
pub struct AttachedStream {
    pub stream_id: StreamId,
    /// `None` when only replaying a stream that has already finished.
    subscriber: Option<u64>,
    frames: BoxStream<'static, SseFrame>,
}

impl fmt::Debug for AttachedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachedStream")
            .field("stream_id", &self.stream_id)
            .field("subscriber", &self.subscriber)
            .finish()
    }
}

/// What a POST produced.
#[derive(Debug)]
pub enum PostOutcome {
    /// Only notifications or responses were received.
    Accepted,
    /// A single response object or a batch array.
    Json(Value),
    Stream(AttachedStream),
}

struct Subscriber {
    id: u64,
    tx: UnboundedSender<SseFrame>,
}

#[derive(Default)]
struct Streams {
    /// Every stream this session ever opened.
    owned: HashSet<StreamId>,
    /// Streams still being written to, with their current reader.
    open: HashMap<StreamId, Option<Subscriber>>,
    next_subscriber: u64,
}

pub struct StreamTransport {
    session_id: String,
    created_at: Instant,
    state: Mutex<TransportState>,
    observers: RwLock<Vec<TransportObserver>>,
    handler: Arc<McpHandler>,
    events: Arc<InMemoryEventStore>,
    /// Held for the whole of one request's handling, in arrival order.
    request_lock: Arc<tokio::sync::Mutex<()>>,
    streams: Mutex<Streams>,
    standalone_stream_id: StreamId,
    closed: CancellationToken,
    heartbeat: Duration,
}

fn new_stream_id() -> StreamId {
    // Hex only, so the event id prefix split is unambiguous
    Uuid::new_v4().simple().to_string()
}

impl StreamTransport {
    pub fn new(
        handler: Arc<McpHandler>,
        events: Arc<InMemoryEventStore>,
        heartbeat: Duration,
    ) -> Arc<Self> {
        let standalone_stream_id = new_stream_id();
        let mut streams = Streams::default();
        streams.owned.insert(standalone_stream_id.clone());
        streams.open.insert(standalone_stream_id.clone(), None);

        Arc::new(Self {
            session_id: Uuid::new_v4().to_string(),
            created_at: Instant::now(),
            state: Mutex::new(TransportState::Uninitialized),
            observers: RwLock::new(Vec::new()),
            handler,
            events,
            request_lock: Arc::new(tokio::sync::Mutex::new(())),
            streams: Mutex::new(streams),
            standalone_stream_id,
            closed: CancellationToken::new(),
            heartbeat,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> TransportState {
        *self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.state() == TransportState::Active
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Cancelled when the transport closes.
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub fn observe(&self, observer: TransportObserver) {
        self.observers.write().push(observer);
    }

    fn transition(&self, to: TransportState) -> Result<TransportState, TransitionError> {
        let mut state = self.state.lock();
        let from = *state;
        if !from.can_transition_to(to) {
            return Err(TransitionError::Illegal { from, to });
        }
        *state = to;
        Ok(from)
    }

    fn emit(self: &Arc<Self>, event: TransportEvent) {
        let observers = self.observers.read().clone();
        for observer in observers {
            observer(self, &event);
        }
    }

    /// Mark the session initialized. Observers see it after this returns Ok.
    pub fn activate(self: &Arc<Self>) -> Result<(), TransitionError> {
        self.transition(TransportState::Active)?;
        info!("MCP session {} initialized", self.session_id);
        self.emit(TransportEvent::Initialized {
            session_id: self.session_id.clone(),
        });
        Ok(())
    }

    /// Close the transport, ending every open stream.
    ///
    /// Returns false if it was already closed.
    pub fn close(self: &Arc<Self>) -> bool {
        if self.transition(TransportState::Closed).is_err() {
            return false;
        }
        self.closed.cancel();
        self.streams.lock().open.clear();
        info!(
            "MCP session {} closed after {}s",
            self.session_id,
            self.age().as_secs()
        );
        self.emit(TransportEvent::Closed {
            session_id: self.session_id.clone(),
        });
        self.observers.write().clear();
        true
    }

    /// Record a message on a stream and forward it to the stream's reader.
    pub fn publish(&self, stream_id: &str, message: Value) {
        let data = message.to_string();
        // Store and send under one lock so a concurrent resume sees either
        // the stored event or the live frame.
        let mut streams = self.streams.lock();
        let event_id = self.events.store_event(stream_id, message);
        if let Some(slot) = streams.open.get_mut(stream_id) {
            if let Some(subscriber) = slot {
                if subscriber
                    .tx
                    .send(SseFrame::message(Some(event_id), data))
                    .is_err()
                {
                    debug!("Reader of stream {} went away", stream_id);
                    *slot = None;
                }
            }
        }
    }

    /// Send a message on the session's standalone stream.
    pub fn notify(&self, message: Value) {
        self.publish(&self.standalone_stream_id, message);
    }

    fn notifier_for(self: &Arc<Self>, stream_id: StreamId) -> Notifier {
        let transport = Arc::clone(self);
        Notifier::new(move |notification| {
            transport.publish(&stream_id, notification.into_value())
        })
    }

    fn standalone_notifier(self: &Arc<Self>) -> Notifier {
        self.notifier_for(self.standalone_stream_id.clone())
    }

    fn owns(&self, stream_id: &str) -> bool {
        self.streams.lock().owned.contains(stream_id)
    }

    /// Open a fresh stream with a reader attached.
    fn open_stream(&self) -> (StreamId, u64, UnboundedReceiverStream<SseFrame>) {
        let stream_id = new_stream_id();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut streams = self.streams.lock();
        let id = streams.next_subscriber;
        streams.next_subscriber += 1;
        streams.owned.insert(stream_id.clone());
        streams
            .open
            .insert(stream_id.clone(), Some(Subscriber { id, tx }));
        (stream_id, id, UnboundedReceiverStream::new(rx))
    }

    /// Attach a new reader to an open stream, replacing any previous one.
    /// Returns `None` if the stream has finished.
    fn attach(&self, stream_id: &str) -> Option<(u64, UnboundedReceiverStream<SseFrame>)> {
        let mut streams = self.streams.lock();
        let id = streams.next_subscriber;
        let slot = streams.open.get_mut(stream_id)?;
        let (tx, rx) = mpsc::unbounded_channel();
        *slot = Some(Subscriber { id, tx });
        streams.next_subscriber += 1;
        Some((id, UnboundedReceiverStream::new(rx)))
    }

    /// Drop a reader, unless it has already been replaced.
    pub fn detach(&self, stream_id: &str, subscriber: u64) {
        let mut streams = self.streams.lock();
        if let Some(slot) = streams.open.get_mut(stream_id) {
            if slot.as_ref().is_some_and(|s| s.id == subscriber) {
                debug!("Detached reader {} from stream {}", subscriber, stream_id);
                *slot = None;
            }
        }
    }

    /// Stop writing to a stream; its reader sees end of stream.
    fn finish_stream(&self, stream_id: &str) {
        self.streams.lock().open.remove(stream_id);
    }

    /// Handle one POST body addressed to this transport.
    pub async fn handle_post(
        self: &Arc<Self>,
        batch: InboundBatch,
        mode: ResponseMode,
    ) -> Result<PostOutcome, McpError> {
        match self.state() {
            TransportState::Closed => return Err(McpError::NoValidSession),
            TransportState::Uninitialized => return self.initialize(batch).await,
            TransportState::Active if batch.contains_initialize() => {
                return Err(McpError::InvalidRequest(
                    "Server already initialized".to_string(),
                ))
            }
            TransportState::Active => {}
        }

        if !batch.has_requests() {
            let _guard = self.request_lock.lock().await;
            let notifier = self.standalone_notifier();
            for request in batch.into_requests() {
                if let Err(e) = self.handler.handle_request(request, &notifier).await {
                    warn!("MCP: Notification handling failed: {}", e);
                }
            }
            return Ok(PostOutcome::Accepted);
        }

        let is_batch = batch.is_batch;
        let requests = batch.into_requests();
        match mode {
            ResponseMode::Json => self.respond_json(requests, is_batch).await,
            ResponseMode::Sse => Ok(PostOutcome::Stream(self.respond_sse(requests).await)),
        }
    }

    async fn initialize(self: &Arc<Self>, batch: InboundBatch) -> Result<PostOutcome, McpError> {
        if !batch.is_initialize() {
            return Err(McpError::NoValidSession);
        }
        let Some(request) = batch.into_requests().pop() else {
            return Err(McpError::NoValidSession);
        };

        let _guard = self.request_lock.lock().await;
        let response = self
            .handler
            .handle_request(request, &Notifier::discard())
            .await
            .map_err(|e| McpError::Internal(e.into()))?;
        let Some(response) = response else {
            return Err(McpError::NoValidSession);
        };

        if response.is_error() {
            self.close();
        } else {
            self.activate()
                .map_err(|e| McpError::Internal(anyhow::Error::new(e)))?;
        }
        Ok(PostOutcome::Json(response.into_value()))
    }

    async fn respond_json(
        self: &Arc<Self>,
        requests: Vec<JsonRpcRequest>,
        is_batch: bool,
    ) -> Result<PostOutcome, McpError> {
        let _guard = self.request_lock.lock().await;
        let notifier = self.standalone_notifier();
        let mut responses = Vec::new();
        for request in requests {
            match self.handler.handle_request(request, &notifier).await {
                Ok(Some(response)) => responses.push(response.into_value()),
                Ok(None) => {}
                Err(e) => return Err(McpError::Internal(e.into())),
            }
        }

        if is_batch {
            return Ok(PostOutcome::Json(Value::Array(responses)));
        }
        match responses.pop() {
            Some(response) => Ok(PostOutcome::Json(response)),
            None => Ok(PostOutcome::Accepted),
        }
    }

    /// Answer on a fresh SSE stream. The requests run in a background task so
    /// their responses land in the event store even if the client drops.
    ///
    /// The request lock is taken before the task is spawned, so the task runs
    /// after every earlier request on this session.
    async fn respond_sse(self: &Arc<Self>, requests: Vec<JsonRpcRequest>) -> AttachedStream {
        let guard = Arc::clone(&self.request_lock).lock_owned().await;
        let (stream_id, subscriber, frames) = self.open_stream();
        let transport = Arc::clone(self);
        let task_stream = stream_id.clone();

        tokio::spawn(async move {
            let _guard = guard;
            let notifier = transport.notifier_for(task_stream.clone());
            for request in requests {
                let id = request.id.clone();
                let is_notification = request.is_notification();
                match transport.handler.handle_request(request, &notifier).await {
                    Ok(Some(response)) => transport.publish(&task_stream, response.into_value()),
                    Ok(None) => {}
                    Err(e) => {
                        // Already streaming: report in-band
                        error!("MCP: Request failed: {:#}", anyhow::Error::new(e));
                        if !is_notification {
                            transport.publish(
                                &task_stream,
                                JsonRpcResponse::internal_error(id).into_value(),
                            );
                        }
                    }
                }
            }
            transport.finish_stream(&task_stream);
        });

        AttachedStream {
            stream_id,
            subscriber: Some(subscriber),
            frames: frames.boxed(),
        }
    }

    /// Open the standalone stream for server-initiated messages.
    pub fn open_standalone(&self) -> Result<AttachedStream, McpError> {
        {
            let streams = self.streams.lock();
            if let Some(Some(subscriber)) = streams.open.get(&self.standalone_stream_id) {
                if !subscriber.tx.is_closed() {
                    return Err(McpError::StreamConflict);
                }
            }
        }
        let Some((subscriber, frames)) = self.attach(&self.standalone_stream_id) else {
            return Err(McpError::NoValidSession);
        };
        debug!("MCP session {} opened standalone stream", self.session_id);
        Ok(AttachedStream {
            stream_id: self.standalone_stream_id.clone(),
            subscriber: Some(subscriber),
            frames: frames.boxed(),
        })
    }

    /// Resume a stream after `last_event_id`: replay what was missed, then
    /// continue live if the stream is still open.
    ///
    /// An id this session never issued opens the standalone stream instead.
    pub async fn resume(&self, last_event_id: &str) -> Result<AttachedStream, McpError> {
        let stream_id = match self.events.stream_of(last_event_id) {
            Some(stream_id) if self.owns(&stream_id) => stream_id,
            _ => {
                debug!(
                    "MCP session {}: unknown Last-Event-ID {}",
                    self.session_id, last_event_id
                );
                return self.open_standalone();
            }
        };

        // Attach before replaying so nothing published in between is lost
        let attached = self.attach(&stream_id);

        let mut replayed = Vec::new();
        self.events
            .replay_events_after(Some(last_event_id), |event_id, message| {
                replayed.push(SseFrame::message(Some(event_id), message.to_string()));
                async { Ok::<(), Infallible>(()) }
            })
            .await
            .unwrap_or_else(|never| match never {});
        debug!(
            "MCP session {}: replaying {} events on stream {}",
            self.session_id,
            replayed.len(),
            stream_id
        );

        let watermark = replayed
            .last()
            .and_then(|frame| frame.event_id.clone())
            .unwrap_or_else(|| last_event_id.to_string());
        let replay = stream::iter(replayed);

        Ok(match attached {
            Some((subscriber, live)) => {
                // Live frames already covered by the replay are skipped
                let live = live.filter(move |frame| {
                    let fresh = frame
                        .event_id
                        .as_deref()
                        .map_or(true, |id| id > watermark.as_str());
                    futures::future::ready(fresh)
                });
                AttachedStream {
                    stream_id,
                    subscriber: Some(subscriber),
                    frames: replay.chain(live).boxed(),
                }
            }
            None => AttachedStream {
                stream_id,
                subscriber: None,
                frames: replay.boxed(),
            },
        })
    }

    /// Turn an attached stream into an SSE body. Dropping the body (client
    /// disconnect) detaches the reader but keeps the session.
    pub fn sse_body(
        self: &Arc<Self>,
        attached: AttachedStream,
    ) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
        let AttachedStream {
            stream_id,
            subscriber,
            frames,
        } = attached;
        let transport = Arc::clone(self);
        let guard = DisconnectGuard::new(move || {
            if let Some(subscriber) = subscriber {
                transport.detach(&stream_id, subscriber);
            }
        });
        sse_stream(frames, self.heartbeat, self.closed_token(), guard)
    }
}

impl fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTransport")
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::dispatcher::{
        CallToolResult, DispatchError, ToolCall, ToolDescriptor, ToolDispatcher,
    };
    use crate::mcp::handler::tests::echo_handler;
    use crate::mcp::handler::ServerIdentity;
    use crate::mcp::sse_stream::HEARTBEAT_INTERVAL;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Calls to `gate` block until released. Records overlap and call order.
    #[derive(Default)]
    struct Gate {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        order: Mutex<Vec<u64>>,
        release: Notify,
    }

    impl Gate {
        fn entered(&self) -> usize {
            self.order.lock().len()
        }
    }

    struct GateTools(Arc<Gate>);

    #[async_trait]
    impl ToolDispatcher for GateTools {
        fn tools(&self) -> Vec<ToolDescriptor> {
            vec![ToolDescriptor {
                name: "gate".to_string(),
                description: "Wait until released".to_string(),
                input_schema: json!({"type": "object"}),
            }]
        }

        async fn call(&self, call: ToolCall) -> Result<CallToolResult, DispatchError> {
            let gate = &self.0;
            let now = gate.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            gate.peak.fetch_max(now, Ordering::SeqCst);
            let n = call
                .arguments
                .as_ref()
                .and_then(|a| a.get("n"))
                .and_then(Value::as_u64)
                .unwrap_or_default();
            gate.order.lock().push(n);
            gate.release.notified().await;
            gate.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(CallToolResult::text("released"))
        }
    }

    fn gated_transport() -> (Arc<StreamTransport>, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        let handler =
            McpHandler::new(Arc::new(GateTools(Arc::clone(&gate))), ServerIdentity::default())
                .unwrap();
        let transport = StreamTransport::new(
            Arc::new(handler),
            Arc::new(InMemoryEventStore::new()),
            HEARTBEAT_INTERVAL,
        );
        transport.activate().unwrap();
        (transport, gate)
    }

    fn gate_batch(n: u64) -> InboundBatch {
        InboundBatch::from_value(json!({
            "jsonrpc": "2.0",
            "id": n,
            "method": "tools/call",
            "params": {"name": "gate", "arguments": {"n": n}}
        }))
        .unwrap()
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    fn transport() -> Arc<StreamTransport> {
        StreamTransport::new(
            Arc::new(echo_handler()),
            Arc::new(InMemoryEventStore::new()),
            HEARTBEAT_INTERVAL,
        )
    }

    fn initialize_batch() -> InboundBatch {
        InboundBatch::from_value(json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "test"}
            }
        }))
        .unwrap()
    }

    fn call_batch(id: u64) -> InboundBatch {
        InboundBatch::from_value(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": "echo", "arguments": {"n": id}}
        }))
        .unwrap()
    }

    async fn next_frame(frames: &mut BoxStream<'static, SseFrame>) -> SseFrame {
        tokio::time::timeout(Duration::from_secs(2), frames.next())
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_transitions() {
        use TransportState::*;
        assert!(Uninitialized.can_transition_to(Active));
        assert!(Uninitialized.can_transition_to(Closed));
        assert!(Active.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Active));
        assert!(!Active.can_transition_to(Uninitialized));
        assert!(!Closed.can_transition_to(Closed));
    }

    #[tokio::test]
    async fn test_observers_see_lifecycle_once() {
        let transport = transport();
        let initialized = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let (i, c) = (initialized.clone(), closed.clone());
        transport.observe(Arc::new(move |_, event| match event {
            TransportEvent::Initialized { .. } => {
                i.fetch_add(1, Ordering::SeqCst);
            }
            TransportEvent::Closed { .. } => {
                c.fetch_add(1, Ordering::SeqCst);
            }
        }));

        transport.activate().unwrap();
        assert_eq!(
            transport.activate(),
            Err(TransitionError::Illegal {
                from: TransportState::Active,
                to: TransportState::Active
            })
        );
        assert!(transport.close());
        assert!(!transport.close());
        assert_eq!(initialized.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(transport.closed_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_initialize_activates_transport() {
        let transport = transport();
        let outcome = transport
            .handle_post(initialize_batch(), ResponseMode::Json)
            .await
            .unwrap();
        assert!(matches!(outcome, PostOutcome::Json(ref v) if v["id"] == 0));
        assert!(transport.is_active());

        let again = transport
            .handle_post(initialize_batch(), ResponseMode::Json)
            .await;
        assert!(matches!(again, Err(McpError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_uninitialized_transport_rejects_other_requests() {
        let transport = transport();
        let result = transport.handle_post(call_batch(1), ResponseMode::Json).await;
        assert!(matches!(result, Err(McpError::NoValidSession)));
        assert_eq!(transport.state(), TransportState::Uninitialized);
    }

    #[tokio::test]
    async fn test_internal_error_in_json_mode() {
        let transport = transport();
        transport.activate().unwrap();
        let batch = InboundBatch::from_value(json!({
            "jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {"name": "fail"}
        }))
        .unwrap();
        let result = transport.handle_post(batch, ResponseMode::Json).await;
        assert!(matches!(result, Err(McpError::Internal(_))));
    }

    #[tokio::test]
    async fn test_sse_response_then_resume_replays_missed_events() {
        let transport = transport();
        transport.activate().unwrap();

        let batch = InboundBatch::from_value(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": {"name": "echo", "_meta": {"progressToken": 1}}
        }))
        .unwrap();
        let PostOutcome::Stream(mut attached) =
            transport.handle_post(batch, ResponseMode::Sse).await.unwrap()
        else {
            panic!("expected stream");
        };

        let first = next_frame(&mut attached.frames).await;
        assert!(first.data.contains("notifications/progress"));
        let first_id = first.event_id.clone().unwrap();

        // Disconnect after the first event
        let stream_id = attached.stream_id.clone();
        transport.detach(&stream_id, attached.subscriber.unwrap());
        drop(attached);

        // Let the request task finish
        let _ = transport.request_lock.lock().await;

        let resumed = transport.resume(&first_id).await.unwrap();
        assert_eq!(resumed.stream_id, stream_id);
        assert!(resumed.subscriber.is_none());
        let rest: Vec<SseFrame> = resumed.frames.collect().await;
        assert_eq!(rest.len(), 2);
        assert!(rest[0].data.contains("notifications/progress"));
        assert!(rest[1].data.contains("\"id\":7"));
        assert!(rest.iter().all(|f| f.event_id.as_deref() != Some(first_id.as_str())));
    }

    #[tokio::test]
    async fn test_resume_of_open_stream_continues_live() {
        let transport = transport();
        transport.activate().unwrap();
        let method = |frame: &SseFrame| {
            let message: Value = serde_json::from_str(&frame.data).unwrap();
            message["method"].as_str().unwrap().to_string()
        };

        let mut attached = transport.open_standalone().unwrap();
        transport.notify(json!({"jsonrpc": "2.0", "method": "a"}));
        let a = next_frame(&mut attached.frames).await;
        let a_id = a.event_id.clone().unwrap();

        // Disconnect, then miss one message
        transport.detach(&attached.stream_id, attached.subscriber.unwrap());
        drop(attached);
        transport.notify(json!({"jsonrpc": "2.0", "method": "b"}));

        let mut resumed = transport.resume(&a_id).await.unwrap();
        assert!(resumed.subscriber.is_some());
        transport.notify(json!({"jsonrpc": "2.0", "method": "c"}));

        let b = next_frame(&mut resumed.frames).await;
        let c = next_frame(&mut resumed.frames).await;
        assert_eq!(method(&b), "b");
        assert_eq!(method(&c), "c");
        assert!(b.event_id.as_deref() > Some(a_id.as_str()));
        assert!(c.event_id > b.event_id);

        transport.close();
        let rest: Vec<SseFrame> = resumed.frames.collect().await;
        assert!(rest.is_empty());
    }

    async fn assert_requests_serialized(mode: ResponseMode) {
        let (transport, gate) = gated_transport();

        let posts: Vec<_> = (1..=2)
            .map(|n| {
                let transport = Arc::clone(&transport);
                tokio::spawn(async move { transport.handle_post(gate_batch(n), mode).await })
            })
            .collect();

        wait_until(|| gate.entered() == 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(gate.entered(), 1);

        gate.release.notify_one();
        wait_until(|| gate.entered() == 2).await;
        gate.release.notify_one();

        for post in posts {
            post.await.unwrap().unwrap();
        }
        wait_until(|| gate.in_flight.load(Ordering::SeqCst) == 0).await;
        assert_eq!(gate.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_json_requests_on_one_session_are_serialized() {
        assert_requests_serialized(ResponseMode::Json).await;
    }

    #[tokio::test]
    async fn test_sse_requests_on_one_session_are_serialized() {
        assert_requests_serialized(ResponseMode::Sse).await;
    }

    #[tokio::test]
    async fn test_requests_run_in_arrival_order() {
        let (transport, gate) = gated_transport();

        let first = transport
            .handle_post(gate_batch(1), ResponseMode::Sse)
            .await
            .unwrap();
        let later = {
            let transport = Arc::clone(&transport);
            tokio::spawn(
                async move { transport.handle_post(gate_batch(2), ResponseMode::Json).await },
            )
        };

        wait_until(|| gate.entered() == 1).await;
        gate.release.notify_one();
        wait_until(|| gate.entered() == 2).await;
        gate.release.notify_one();

        later.await.unwrap().unwrap();
        assert_eq!(*gate.order.lock(), vec![1, 2]);
        drop(first);
    }

    #[tokio::test]
    async fn test_standalone_stream_conflict() {
        let transport = transport();
        transport.activate().unwrap();
        let first = transport.open_standalone().unwrap();
        assert!(matches!(
            transport.open_standalone(),
            Err(McpError::StreamConflict)
        ));

        transport.detach(&first.stream_id, first.subscriber.unwrap());
        assert!(transport.open_standalone().is_ok());
    }

    #[tokio::test]
    async fn test_resume_with_unknown_id_opens_standalone() {
        let transport = transport();
        transport.activate().unwrap();
        let mut attached = transport.resume("nope_0").await.unwrap();
        transport.notify(json!({"jsonrpc": "2.0", "method": "ping"}));
        let frame = next_frame(&mut attached.frames).await;
        assert!(frame.data.contains("ping"));
    }

    #[tokio::test]
    async fn test_close_ends_open_streams() {
        let transport = transport();
        transport.activate().unwrap();
        let mut attached = transport.open_standalone().unwrap();
        transport.close();
        let end = tokio::time::timeout(Duration::from_secs(2), attached.frames.next())
            .await
            .unwrap();
        assert!(end.is_none());
    }
}
