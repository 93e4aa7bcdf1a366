//! Event Stream Consumer
//!
//! Follows one operation channel at a time and keeps the ordered event log of
//! the current operation.
//!
//! # State machine
//!
//! ```text
//! idle ──open──▶ connecting ──ok──▶ connected ──complete──▶ completed
//!                    │                  │
//!                    └──connect error───┴──error / drop──▶ failed
//! ```
//!
//! `close()` from any state returns to `idle`. The live connection is held in
//! a guard, so dropping the consumer or replacing the channel always tears the
//! transport down. There is no reconnect: after `failed` the caller opens a
//! fresh channel.

use crate::client::StreamConnector;
use crate::error::{SessionError, SessionResult};
use crate::sse::EventStream;
use futures::StreamExt;
use plsort_common::{EventType, OperationChannel, ProgressEvent};
use tracing::{debug, info, warn};

/// Connection state of the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Connected,
    Completed,
    Failed,
}

impl StreamState {
    /// A connection is being opened or is open
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Callbacks invoked while dispatching events
pub trait StreamObserver: Send {
    /// A `progress` event was appended
    fn on_progress(&mut self, _event: &ProgressEvent) {}

    /// The operation completed; fires once per operation
    fn on_complete(&mut self) {}

    /// The operation failed or the connection dropped
    fn on_error(&mut self, _message: &str) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StreamObserver for NoopObserver {}

/// Outcome of dispatching one inbound message
#[derive(Debug)]
pub enum Dispatch {
    /// No live connection to read from
    Inactive,
    /// A non-terminal event was appended
    Appended(ProgressEvent),
    /// A `complete` event was appended and the connection closed
    Completed(ProgressEvent),
    /// The operation failed and the connection closed
    Failed(SessionError),
}

/// Live connection; dropping it tears down the transport
struct Connection {
    channel: OperationChannel,
    events: EventStream,
}

impl Drop for Connection {
    fn drop(&mut self) {
        info!(channel = %self.channel, "Event stream closed");
    }
}

/// Consumer of one operation channel at a time
pub struct EventStreamConsumer {
    state: StreamState,
    channel: Option<OperationChannel>,
    connection: Option<Connection>,
    events: Vec<ProgressEvent>,
    error: Option<String>,
    observer: Box<dyn StreamObserver>,
}

impl Default for EventStreamConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStreamConsumer {
    pub fn new() -> Self {
        Self {
            state: StreamState::Idle,
            channel: None,
            connection: None,
            events: Vec::new(),
            error: None,
            observer: Box::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: impl StreamObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn set_observer(&mut self, observer: impl StreamObserver + 'static) {
        self.observer = Box::new(observer);
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn is_connected(&self) -> bool {
        self.state == StreamState::Connected
    }

    /// Channel currently followed, or last followed if not yet closed
    pub fn channel(&self) -> Option<&OperationChannel> {
        self.channel.as_ref()
    }

    /// Events of the current operation in arrival order
    pub fn events(&self) -> &[ProgressEvent] {
        &self.events
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn latest_event(&self) -> Option<&ProgressEvent> {
        self.events.last()
    }

    /// Most recent event carrying both counters
    pub fn latest_counters(&self) -> Option<(u32, u32)> {
        self.events
            .iter()
            .rev()
            .find_map(|e| e.current.zip(e.total))
    }

    /// Completion fraction of the most recent event that reports one
    pub fn fraction(&self) -> Option<f64> {
        if self.state == StreamState::Completed {
            return Some(1.0);
        }
        self.events.iter().rev().find_map(ProgressEvent::fraction)
    }

    /// Point the consumer at a channel, or at nothing
    pub async fn set_channel<C>(
        &mut self,
        connector: &C,
        channel: Option<OperationChannel>,
    ) -> SessionResult<()>
    where
        C: StreamConnector + ?Sized,
    {
        match channel {
            Some(channel) => self.open(connector, channel).await,
            None => {
                self.close();
                Ok(())
            }
        }
    }

    /// Start following a new operation
    ///
    /// Any live connection is closed first and the previous operation's log
    /// is discarded.
    pub async fn open<C>(&mut self, connector: &C, channel: OperationChannel) -> SessionResult<()>
    where
        C: StreamConnector + ?Sized,
    {
        self.connection = None;
        self.events.clear();
        self.error = None;
        self.channel = Some(channel.clone());
        self.transition(StreamState::Connecting);

        match connector.connect(&channel).await {
            Ok(events) => {
                self.connection = Some(Connection { channel, events });
                self.transition(StreamState::Connected);
                Ok(())
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, "Failed to open event stream");
                self.fail(e.user_message());
                Err(e)
            }
        }
    }

    /// Tear down the connection and return to idle, keeping the log
    pub fn close(&mut self) {
        self.connection = None;
        self.channel = None;
        self.transition(StreamState::Idle);
    }

    /// Forget the last failure without touching the log
    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Reset log and error; rejected while a connection is active
    pub fn clear(&mut self) -> SessionResult<()> {
        if self.state.is_active() {
            return Err(SessionError::InvalidOperation(
                "Cannot clear the event log while an operation is running".into(),
            ));
        }
        self.events.clear();
        self.error = None;
        self.channel = None;
        self.transition(StreamState::Idle);
        Ok(())
    }

    /// Wait for the next inbound message and dispatch it
    ///
    /// Cancel safe: dropping the returned future before it resolves loses no
    /// event.
    pub async fn next(&mut self) -> Dispatch {
        let inbound = match self.connection.as_mut() {
            Some(connection) => connection.events.next().await,
            None => return Dispatch::Inactive,
        };

        match inbound {
            Some(Ok(event)) => self.dispatch(event),
            Some(Err(e)) => {
                warn!(channel = ?self.channel, error = %e, "Event stream transport error");
                self.lose_connection()
            }
            None => {
                warn!(channel = ?self.channel, "Event stream ended without a terminal event");
                self.lose_connection()
            }
        }
    }

    fn dispatch(&mut self, event: ProgressEvent) -> Dispatch {
        self.events.push(event.clone());
        match event.kind {
            EventType::Progress => {
                self.observer.on_progress(&event);
                Dispatch::Appended(event)
            }
            EventType::Complete => {
                self.connection = None;
                self.transition(StreamState::Completed);
                self.observer.on_complete();
                Dispatch::Completed(event)
            }
            EventType::Error => {
                self.fail(event.message.clone());
                Dispatch::Failed(SessionError::StreamError(event.message))
            }
            EventType::Info | EventType::Other => {
                debug!(message = %event.message, "Stream notice");
                Dispatch::Appended(event)
            }
        }
    }

    fn lose_connection(&mut self) -> Dispatch {
        self.fail(SessionError::ConnectionLost.to_string());
        Dispatch::Failed(SessionError::ConnectionLost)
    }

    fn fail(&mut self, message: String) {
        self.connection = None;
        self.transition(StreamState::Failed);
        self.observer.on_error(&message);
        self.error = Some(message);
    }

    fn transition(&mut self, next: StreamState) {
        if self.state != next {
            debug!(from = self.state.as_str(), to = next.as_str(), "Stream state change");
            self.state = next;
        }
    }
}

impl std::fmt::Debug for EventStreamConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStreamConsumer")
            .field("state", &self.state)
            .field("channel", &self.channel)
            .field("events", &self.events.len())
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
