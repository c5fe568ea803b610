use crate::error::{Error, ErrorKind};
use crate::message::Event;
use crate::transport::{EventReceiver, Transport};
use async_stream::stream;
use axum::response::sse::Event as SseEvent;
use futures_core::Stream;
use log::*;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default idle window before an inactive connection is timed out
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

// Client IDs are supplied by callers; the registry enforces uniqueness
pub type ClientId = String;

/// Unique identifier for one push stream (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a connection. Everything except `Active` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Active,
    Completed,
    TimedOut,
    Failed { reason: String },
    Closed,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, State::Active)
    }

    /// Reason handed to the transport when the stream ends badly.
    fn failure_reason(&self) -> Option<String> {
        match self {
            State::TimedOut => Some(ErrorKind::IdleTimeout.to_string()),
            State::Failed { reason } => Some(reason.clone()),
            State::Active | State::Completed | State::Closed => None,
        }
    }
}

/// Observer notified once, on a connection's first terminal transition.
pub trait TerminalListener: Send + Sync {
    fn on_terminal(&self, client_id: &str, connection_id: &ConnectionId, state: &State);
}

/// One client's open push stream and its state machine.
///
/// Only the first terminal transition has any effect: it ends the transport
/// and, when the transition originated from the connection itself (transport
/// event, idle timeout, explicit call), notifies the single registered
/// [`TerminalListener`].
pub struct Connection {
    client_id: ClientId,
    id: ConnectionId,
    idle_timeout: Option<Duration>,
    state: watch::Sender<State>,
    last_activity: Mutex<Instant>,
    transport: Box<dyn Transport>,
    listener: OnceLock<Weak<dyn TerminalListener>>,
}

impl Connection {
    /// `idle_timeout` of `None` means the connection never expires on its own.
    pub fn new<T>(client_id: ClientId, idle_timeout: Option<Duration>, transport: T) -> Arc<Self>
    where
        T: Transport + 'static,
    {
        let (state, _) = watch::channel(State::Active);
        Arc::new(Self {
            client_id,
            id: ConnectionId::new(),
            idle_timeout,
            state,
            last_activity: Mutex::new(Instant::now()),
            transport: Box::new(transport),
            listener: OnceLock::new(),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    pub fn state(&self) -> State {
        self.state.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        !self.state.borrow().is_terminal()
    }

    /// Watch state transitions, e.g. to wait for the connection to end.
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    /// Install the terminal listener. Returns false if one was already set.
    pub fn set_listener(&self, listener: Weak<dyn TerminalListener>) -> bool {
        self.listener.set(listener).is_ok()
    }

    /// Write one event. A failed write leaves the state untouched; what to do
    /// about it is up to the caller.
    pub fn send(&self, event: &Event) -> Result<(), Error> {
        if !self.is_active() {
            return Err(Error::new(ErrorKind::NotActive));
        }
        self.transport.write(event)?;
        *self.last_activity.lock() = Instant::now();
        Ok(())
    }

    pub fn complete(&self) -> bool {
        self.finish(State::Completed)
    }

    pub fn timeout(&self) -> bool {
        self.finish(State::TimedOut)
    }

    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.finish(State::Failed {
            reason: reason.into(),
        })
    }

    pub fn close(&self) -> bool {
        self.finish(State::Closed)
    }

    fn finish(&self, next: State) -> bool {
        if !self.transition(next) {
            return false;
        }

        if let Some(listener) = self.listener.get().and_then(Weak::upgrade) {
            listener.on_terminal(&self.client_id, &self.id, &self.state());
        }
        true
    }

    /// Move to a terminal state without notifying the listener. The registry
    /// uses this for transitions it drives itself, since it already performs
    /// the cleanup the listener would trigger.
    pub(crate) fn transition(&self, next: State) -> bool {
        debug_assert!(next.is_terminal());

        let won = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = next;
                true
            }
        });
        if !won {
            trace!(
                "Ignoring transition for connection {} of client {}, already {:?}",
                self.id,
                self.client_id,
                self.state()
            );
            return false;
        }

        let state = self.state();
        self.transport.finish(state.failure_reason().as_deref());

        match &state {
            State::Completed => info!(
                "SSE connection {} for client {} completed",
                self.id, self.client_id
            ),
            State::Closed => info!(
                "SSE connection {} for client {} closed on request",
                self.id, self.client_id
            ),
            State::TimedOut => error!(
                "SSE connection {} for client {} timed out: {}",
                self.id,
                self.client_id,
                ErrorKind::IdleTimeout
            ),
            State::Failed { reason } => error!(
                "SSE connection {} for client {} failed: {}",
                self.id, self.client_id, reason
            ),
            State::Active => {}
        }
        true
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Connection")
            .field("client_id", &self.client_id)
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Spawn the task that times the connection out once it has been idle for
/// its configured window. Returns `None` when the connection never expires.
pub fn spawn_idle_watchdog(connection: &Arc<Connection>) -> Option<JoinHandle<()>> {
    let timeout = connection.idle_timeout()?;
    let connection = Arc::clone(connection);
    Some(tokio::spawn(watch_idle(connection, timeout)))
}

async fn watch_idle(connection: Arc<Connection>, timeout: Duration) {
    let mut state = connection.subscribe();

    loop {
        if state.borrow_and_update().is_terminal() {
            return;
        }

        let deadline = connection.last_activity() + timeout;
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                // Activity may have pushed the deadline out while we slept
                if connection.last_activity() + timeout <= Instant::now() {
                    connection.timeout();
                    return;
                }
            }
        }
    }
}

/// What the orchestration layer gets back from starting a connection: the
/// connection itself plus the receiving end of its push stream.
pub struct ConnectionHandle {
    connection: Arc<Connection>,
    events: EventReceiver,
}

impl ConnectionHandle {
    pub fn new(connection: Arc<Connection>, events: EventReceiver) -> Self {
        Self { connection, events }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Turn the handle into an SSE response body. Dropping the stream before
    /// the connection has ended (the client went away) fails the connection
    /// with a transport error.
    pub fn into_stream(self) -> impl Stream<Item = Result<SseEvent, Infallible>> {
        let Self {
            connection,
            mut events,
        } = self;
        let guard = DisconnectGuard(connection);

        stream! {
            let _guard = guard;
            while let Some(event) = events.recv().await {
                yield event;
            }
        }
    }
}

struct DisconnectGuard(Arc<Connection>);

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.0.is_active() {
            let err = Error::with_source(ErrorKind::TransportError, "response stream dropped");
            self.0.fail(err.to_string());
        }
    }
}
