//! In-memory event log backing SSE resumability.
//!
//! Every message written to a Streamable HTTP stream is recorded here under
//! an id that sorts in write order. A client reconnecting with
//! `Last-Event-ID` gets the messages it missed on that same stream.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::ops::Bound;
use std::time::{SystemTime, UNIX_EPOCH};

pub type StreamId = String;
pub type EventId = String;

#[derive(Debug, Clone)]
struct StoredEvent {
    stream_id: StreamId,
    message: Value,
}

#[derive(Debug, Default)]
struct EventLog {
    events: BTreeMap<EventId, StoredEvent>,
    last_millis: u128,
    sequence: u64,
}

/// Event log shared by all sessions of one server.
///
/// Stream ids are globally unique, so one log can hold every stream without
/// collisions.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: Mutex<EventLog>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message on a stream and return its event id.
    ///
    /// Ids have the form `{stream}_{millis}{sequence}_{suffix}`; the clock
    /// part never goes backwards and the sequence is global, so ids
    /// compare in write order within a stream.
    pub fn store_event(&self, stream_id: &str, message: Value) -> EventId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let suffix = uuid::Uuid::new_v4().simple().to_string();

        let mut log = self.log.lock();
        log.last_millis = log.last_millis.max(now);
        log.sequence += 1;
        let event_id = format!(
            "{}_{:013}{:020}_{}",
            stream_id,
            log.last_millis,
            log.sequence,
            &suffix[..8]
        );
        log.events.insert(
            event_id.clone(),
            StoredEvent {
                stream_id: stream_id.to_string(),
                message,
            },
        );
        event_id
    }

    /// Send every event recorded after `last_event_id` on the same stream,
    /// in order, through `send`.
    ///
    /// Returns the stream the id belongs to, or `None` when the id is absent
    /// or unknown (nothing is sent in that case).
    pub async fn replay_events_after<F, Fut, E>(
        &self,
        last_event_id: Option<&str>,
        mut send: F,
    ) -> Result<Option<StreamId>, E>
    where
        F: FnMut(EventId, Value) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let Some(last_event_id) = last_event_id else {
            return Ok(None);
        };

        // Snapshot under the lock, send without it
        let (stream_id, pending) = {
            let log = self.log.lock();
            let Some(anchor) = log.events.get(last_event_id) else {
                return Ok(None);
            };
            let stream_id = anchor.stream_id.clone();
            let pending: Vec<(EventId, Value)> = log
                .events
                .range::<str, _>((Bound::Excluded(last_event_id), Bound::Unbounded))
                .filter(|(_, event)| event.stream_id == stream_id)
                .map(|(id, event)| (id.clone(), event.message.clone()))
                .collect();
            (stream_id, pending)
        };

        for (event_id, message) in pending {
            send(event_id, message).await?;
        }
        Ok(Some(stream_id))
    }

    /// Stream an event id was issued for.
    pub fn stream_of(&self, event_id: &str) -> Option<StreamId> {
        self.log
            .lock()
            .events
            .get(event_id)
            .map(|event| event.stream_id.clone())
    }

    pub fn len(&self) -> usize {
        self.log.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
