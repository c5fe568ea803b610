use crate::connection::{ClientId, Connection, ConnectionId, State, TerminalListener};
use crate::error::{Error, ErrorKind};
use crate::heartbeat::{HeartbeatHandle, HeartbeatScheduler, HeartbeatTask};
use crate::message::{Event, EventType};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::*;
use std::sync::{Arc, Weak};

/// A live connection together with the heartbeat job that keeps it open
struct Session {
    connection: Arc<Connection>,
    heartbeat: HeartbeatHandle,
}

/// Concurrent registry of live push connections, one per client ID.
///
/// Backed by a sharded `DashMap`, so operations on unrelated clients do not
/// contend on a single lock, while `entry()` makes check-and-supersede atomic
/// for one client ID. Nothing here returns an error: failures are logged and
/// reported as booleans so the heartbeat and request paths keep running.
pub struct SessionRegistry {
    sessions: DashMap<ClientId, Session>,
    scheduler: HeartbeatScheduler,
}

impl SessionRegistry {
    pub fn new(scheduler: HeartbeatScheduler) -> Self {
        Self {
            sessions: DashMap::new(),
            scheduler,
        }
    }

    /// Register a connection under its own client ID and schedule its
    /// heartbeat.
    ///
    /// An existing entry for the same client is failed as superseded and its
    /// heartbeat cancelled before the new entry becomes visible. Adding the
    /// connection that is already registered is a no-op.
    pub fn add(self: &Arc<Self>, connection: Arc<Connection>) {
        let client_id: ClientId = connection.client_id().to_string();

        let listener: Weak<dyn TerminalListener> = Arc::downgrade(self) as Weak<dyn TerminalListener>;
        if !connection.set_listener(listener) {
            debug!(
                "Connection {} for client {} already had a terminal listener",
                connection.id(),
                client_id
            );
        }

        match self.sessions.entry(client_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.get();
                if Arc::ptr_eq(&previous.connection, &connection) {
                    warn!(
                        "Connection {} for client {} is already registered",
                        connection.id(),
                        client_id
                    );
                    return;
                }

                let superseded = Error::new(ErrorKind::DuplicateConnection);
                warn!(
                    "Client {} reconnected, connection {} {}",
                    client_id,
                    previous.connection.id(),
                    superseded
                );

                previous.heartbeat.cancel();
                previous.connection.transition(State::Failed {
                    reason: superseded.to_string(),
                });

                let heartbeat = self.schedule_heartbeat(&client_id);
                occupied.insert(Session {
                    connection: Arc::clone(&connection),
                    heartbeat,
                });
            }
            Entry::Vacant(vacant) => {
                let heartbeat = self.schedule_heartbeat(&client_id);
                vacant.insert(Session {
                    connection: Arc::clone(&connection),
                    heartbeat,
                });
            }
        }

        info!(
            "Registered SSE connection {} for client {} ({} live)",
            connection.id(),
            client_id,
            self.sessions.len()
        );

        // The connection may have ended before its listener was installed
        if !connection.is_active() {
            self.on_terminal(&client_id, connection.id(), &connection.state());
        }
    }

    /// Remove the client's entry, completing its connection and cancelling its
    /// heartbeat. Returns whether an entry was removed.
    pub fn remove(&self, client_id: &str) -> bool {
        self.evict(client_id, State::Completed)
    }

    /// Like [`remove`](Self::remove), but the connection ends as `Closed`.
    pub fn close(&self, client_id: &str) -> bool {
        self.evict(client_id, State::Closed)
    }

    fn evict(&self, client_id: &str, state: State) -> bool {
        match self.sessions.remove(client_id) {
            Some((_, session)) => {
                session.heartbeat.cancel();
                session.connection.transition(state);
                info!(
                    "Removed SSE session for client {} ({} live)",
                    client_id,
                    self.sessions.len()
                );
                true
            }
            None => {
                debug!("No SSE session to remove for client {client_id}");
                false
            }
        }
    }

    /// Push an event to the client's live connection. Returns false when the
    /// client is unknown or the write failed; a failed write keeps the entry.
    pub fn send(&self, client_id: &str, event: &Event) -> bool {
        // Clone out of the map so the shard lock is not held during the write
        let Some(connection) = self
            .sessions
            .get(client_id)
            .map(|session| Arc::clone(&session.connection))
        else {
            debug!(
                "No SSE session for client {}, dropping {} event",
                client_id,
                event.event_type()
            );
            return false;
        };

        match connection.send(event) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Failed to send {} event to client {} (connection {}): {}",
                    event.event_type(),
                    client_id,
                    connection.id(),
                    e
                );
                false
            }
        }
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.sessions.contains_key(client_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn schedule_heartbeat(self: &Arc<Self>, client_id: &str) -> HeartbeatHandle {
        self.scheduler.schedule(HeartbeatTask::new(
            client_id.to_string(),
            Arc::downgrade(self),
        ))
    }
}

impl TerminalListener for SessionRegistry {
    /// Single cleanup path for connection-originated endings. Only removes the
    /// entry if it still belongs to `connection_id`, so a superseded stream
    /// ending late cannot evict its replacement.
    fn on_terminal(&self, client_id: &str, connection_id: &ConnectionId, state: &State) {
        let removed = self.sessions.remove_if(client_id, |_, session| {
            session.connection.id() == connection_id
        });

        match removed {
            Some((_, session)) => {
                session.heartbeat.cancel();
                info!(
                    "SSE connection {} for client {} ended as {:?}, session removed ({} live)",
                    connection_id,
                    client_id,
                    state,
                    self.sessions.len()
                );
            }
            None => debug!(
                "SSE connection {connection_id} for client {client_id} already left the registry"
            ),
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(HeartbeatScheduler::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTransport;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::default())
    }

    fn connection(client_id: &str) -> (Arc<Connection>, RecordingTransport) {
        let transport = RecordingTransport::default();
        (
            Connection::new(client_id.to_string(), None, transport.clone()),
            transport,
        )
    }

    #[tokio::test]
    async fn test_add_then_contains() {
        let registry = registry();
        let (conn, _) = connection("c1");

        registry.add(conn);

        assert!(registry.contains("c1"));
        assert!(!registry.contains("c2"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_entry_is_keyed_by_the_connections_own_client_id() {
        let registry = registry();
        let (conn, _) = connection("other");

        registry.add(Arc::clone(&conn));
        assert!(registry.contains("other"));
        assert!(!registry.contains("c1"));

        assert!(conn.timeout());
        assert!(!registry.contains("other"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_adding_the_same_connection_twice_keeps_it_registered() {
        let registry = registry();
        let (conn, _) = connection("c1");

        registry.add(Arc::clone(&conn));
        registry.add(Arc::clone(&conn));

        assert_eq!(conn.state(), State::Active);
        assert!(registry.contains("c1"));
        assert_eq!(registry.len(), 1);

        // The listener installed by the first add still cleans up
        assert!(conn.timeout());
        assert!(!registry.contains("c1"));
    }

    #[tokio::test]
    async fn test_second_add_supersedes_the_first() {
        let registry = registry();
        let (first, first_transport) = connection("c1");
        let (second, _) = connection("c1");

        registry.add(Arc::clone(&first));
        registry.add(Arc::clone(&second));

        match first.state() {
            State::Failed { reason } => assert!(reason.contains("superseded")),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(first_transport.finished().is_some());
        assert_eq!(second.state(), State::Active);
        assert_eq!(registry.len(), 1);

        assert!(registry.send("c1", &Event::message("hello")));
        assert!(first.send(&Event::message("stale")).is_err());
    }

    #[tokio::test]
    async fn test_superseded_connection_ending_late_keeps_the_new_entry() {
        let registry = registry();
        let (first, _) = connection("c1");
        let (second, _) = connection("c1");
        registry.add(Arc::clone(&first));
        registry.add(Arc::clone(&second));

        registry.on_terminal("c1", first.id(), &first.state());

        assert!(registry.contains("c1"));
        assert_eq!(second.state(), State::Active);
    }

    #[tokio::test]
    async fn test_remove_twice() {
        let registry = registry();
        let (conn, transport) = connection("c2");
        registry.add(Arc::clone(&conn));

        assert!(registry.remove("c2"));
        assert!(!registry.remove("c2"));

        assert_eq!(conn.state(), State::Completed);
        assert_eq!(transport.finished(), Some(None));
        assert!(!registry.contains("c2"));
    }

    #[tokio::test]
    async fn test_close_ends_connection_as_closed() {
        let registry = registry();
        let (conn, _) = connection("c3");
        registry.add(Arc::clone(&conn));

        assert!(registry.close("c3"));
        assert_eq!(conn.state(), State::Closed);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_send_to_unknown_client_has_no_side_effects() {
        let registry = registry();
        assert!(!registry.send("unknown", &Event::message("x")));
        assert!(!registry.contains("unknown"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failed_send_keeps_the_entry() {
        let registry = registry();
        let (conn, transport) = connection("c1");
        registry.add(Arc::clone(&conn));
        transport.fail_writes();

        assert!(!registry.send("c1", &Event::message("x")));
        assert!(registry.contains("c1"));
        assert_eq!(conn.state(), State::Active);
    }

    #[tokio::test]
    async fn test_connection_ending_on_its_own_cleans_up() {
        let registry = registry();
        let (conn, _) = connection("c1");
        registry.add(Arc::clone(&conn));

        assert!(conn.timeout());

        assert!(!registry.contains("c1"));
        assert!(!registry.remove("c1"));
    }

    #[tokio::test]
    async fn test_on_terminal_is_idempotent() {
        let registry = registry();
        let (conn, _) = connection("c1");
        let (other, _) = connection("c2");
        registry.add(Arc::clone(&conn));
        registry.add(Arc::clone(&other));
        conn.fail("transport error");

        registry.on_terminal("c1", conn.id(), &conn.state());
        registry.on_terminal("c1", conn.id(), &conn.state());

        assert!(!registry.contains("c1"));
        assert!(registry.contains("c2"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_adding_an_already_ended_connection_leaves_no_entry() {
        let registry = registry();
        let (conn, _) = connection("c1");
        conn.complete();

        registry.add(conn);

        assert!(!registry.contains("c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_heartbeats_after_remove() {
        let registry = registry();
        let (conn, transport) = connection("c1");
        registry.add(conn);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(transport.heartbeats(), 3);

        assert!(registry.remove("c1"));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.heartbeats(), 3);
        assert_eq!(transport.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_heartbeat_stops_and_new_one_starts() {
        let registry = registry();
        let (first, first_transport) = connection("c1");
        let (second, second_transport) = connection("c1");

        registry.add(first);
        tokio::time::sleep(Duration::from_secs(15)).await;
        registry.add(second);
        tokio::time::sleep(Duration::from_secs(15)).await;

        assert_eq!(first_transport.heartbeats(), 2);
        assert_eq!(second_transport.heartbeats(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_leave_one_active_connection() {
        let registry = registry();
        let mut handles = Vec::new();
        let mut connections = Vec::new();

        for _ in 0..16 {
            let (conn, _) = connection("shared");
            connections.push(Arc::clone(&conn));
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.add(conn);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let active = connections.iter().filter(|c| c.is_active()).count();
        assert_eq!(active, 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sends_racing_a_remove_never_resurrect_the_entry() {
        const SENDERS: usize = 8;

        let registry = registry();
        let (conn, transport) = connection("c1");
        registry.add(Arc::clone(&conn));
        let removed = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::new();
        for _ in 0..SENDERS {
            let registry = Arc::clone(&registry);
            let removed = Arc::clone(&removed);
            handles.push(tokio::spawn(async move {
                for _ in 0..500 {
                    let after_remove = removed.load(Ordering::SeqCst);
                    let delivered = registry.send("c1", &Event::message("x"));
                    if after_remove {
                        assert!(!delivered);
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(registry.remove("c1"));
        removed.store(true, Ordering::SeqCst);
        let written_at_removal = transport.events().len();

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(!registry.contains("c1"));
        assert_eq!(conn.state(), State::Completed);
        // Each sender, plus the heartbeat, may have had one write in flight
        assert!(transport.events().len() <= written_at_removal + SENDERS + 1);
    }
}
