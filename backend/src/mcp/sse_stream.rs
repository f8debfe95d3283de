//! Server-Sent Events plumbing shared by the HTTP transports.

use axum::response::sse::Event;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Interval between heartbeat comments on an idle stream.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// One SSE event waiting to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub event_id: Option<String>,
    pub event: String,
    pub data: String,
}

impl SseFrame {
    /// A JSON-RPC message event.
    pub fn message(event_id: Option<String>, data: String) -> Self {
        Self {
            event_id,
            event: "message".to_string(),
            data,
        }
    }

    pub fn into_event(self) -> Event {
        let event = Event::default().event(self.event).data(self.data);
        match self.event_id {
            Some(id) => event.id(id),
            None => event,
        }
    }
}

/// Runs cleanup when the SSE response body is dropped, which is how a client
/// disconnect shows up on the server side. The callback runs exactly once.
pub struct DisconnectGuard {
    on_disconnect: Option<Box<dyn FnOnce() + Send>>,
}

impl DisconnectGuard {
    pub fn new(on_disconnect: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_disconnect: Some(Box::new(on_disconnect)),
        }
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if let Some(on_disconnect) = self.on_disconnect.take() {
            on_disconnect();
        }
    }
}

struct StreamState {
    frames: BoxStream<'static, SseFrame>,
    heartbeat: Interval,
    shutdown: CancellationToken,
    _guard: DisconnectGuard,
}

enum Step {
    Frame(SseFrame),
    Heartbeat,
    Stop,
}

/// Turn a frame source into an SSE body.
///
/// The body ends when the frame source ends or `shutdown` is cancelled, and
/// emits a `ping` comment every `heartbeat` while idle. Dropping the body
/// drops `guard`.
pub fn sse_stream(
    frames: BoxStream<'static, SseFrame>,
    heartbeat: Duration,
    shutdown: CancellationToken,
    guard: DisconnectGuard,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let mut interval = interval_at(Instant::now() + heartbeat, heartbeat);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let state = StreamState {
        frames,
        heartbeat: interval,
        shutdown,
        _guard: guard,
    };

    stream::unfold(state, |mut state| async move {
        let step = tokio::select! {
            biased;
            _ = state.shutdown.cancelled() => Step::Stop,
            frame = state.frames.next() => match frame {
                Some(frame) => Step::Frame(frame),
                None => Step::Stop,
            },
            _ = state.heartbeat.tick() => Step::Heartbeat,
        };
        match step {
            Step::Frame(frame) => Some((Ok(frame.into_event()), state)),
            Step::Heartbeat => {
                debug!("SSE heartbeat");
                Some((Ok(Event::default().comment("ping")), state))
            }
            Step::Stop => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    fn counting_guard() -> (DisconnectGuard, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let guard = DisconnectGuard::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (guard, count)
    }

    #[tokio::test]
    async fn test_frames_are_forwarded_in_order() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (guard, _) = counting_guard();
        let body = sse_stream(
            UnboundedReceiverStream::new(rx).boxed(),
            HEARTBEAT_INTERVAL,
            CancellationToken::new(),
            guard,
        );
        tx.send(SseFrame::message(Some("s_1".into()), "{}".into()))
            .unwrap();
        tx.send(SseFrame::message(Some("s_2".into()), "{}".into()))
            .unwrap();
        drop(tx);

        let events: Vec<_> = body.collect().await;
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_heartbeat_emitted_while_idle() {
        let (_tx, rx) = mpsc::unbounded_channel::<SseFrame>();
        let (guard, _) = counting_guard();
        let mut body = Box::pin(sse_stream(
            UnboundedReceiverStream::new(rx).boxed(),
            Duration::from_millis(20),
            CancellationToken::new(),
            guard,
        ));
        let first = tokio::time::timeout(Duration::from_secs(2), body.next()).await;
        assert!(matches!(first, Ok(Some(Ok(_)))));
    }

    #[tokio::test]
    async fn test_dropping_body_runs_cleanup_once() {
        let (tx, rx) = mpsc::unbounded_channel::<SseFrame>();
        let (guard, count) = counting_guard();
        let mut body = Box::pin(sse_stream(
            UnboundedReceiverStream::new(rx).boxed(),
            Duration::from_millis(10),
            CancellationToken::new(),
            guard,
        ));
        let first = tokio::time::timeout(Duration::from_secs(2), body.next()).await;
        assert!(matches!(first, Ok(Some(Ok(_)))));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        drop(body);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // Nothing reads the frame source any more
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_ends_stream() {
        let (_tx, rx) = mpsc::unbounded_channel::<SseFrame>();
        let (guard, count) = counting_guard();
        let shutdown = CancellationToken::new();
        let body = sse_stream(
            UnboundedReceiverStream::new(rx).boxed(),
            HEARTBEAT_INTERVAL,
            shutdown.clone(),
            guard,
        );
        shutdown.cancel();
        let events: Vec<_> = body.collect().await;
        assert!(events.is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
