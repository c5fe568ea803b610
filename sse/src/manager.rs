use crate::connection::{spawn_idle_watchdog, ClientId, Connection, ConnectionHandle, DEFAULT_IDLE_TIMEOUT};
use crate::heartbeat::{HeartbeatScheduler, DEFAULT_HEARTBEAT_INTERVAL, MIN_HEARTBEAT_WORKERS};
use crate::message::Event;
use crate::registry::SessionRegistry;
use crate::transport::ChannelTransport;
use log::*;
use std::sync::Arc;
use std::time::Duration;

/// Tunables for push sessions
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// Period between heartbeats for one client
    pub heartbeat_interval: Duration,
    /// Idle window before a connection times out; `None` never expires
    pub idle_timeout: Option<Duration>,
    /// Heartbeat ticks allowed to run concurrently
    pub heartbeat_workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            heartbeat_workers: MIN_HEARTBEAT_WORKERS,
        }
    }
}

/// Entry point for the HTTP layer: starts, feeds and closes push connections.
pub struct Manager {
    registry: Arc<SessionRegistry>,
    settings: Settings,
}

impl Manager {
    pub fn new(settings: Settings) -> Self {
        let scheduler =
            HeartbeatScheduler::new(settings.heartbeat_interval, settings.heartbeat_workers);
        Self {
            registry: Arc::new(SessionRegistry::new(scheduler)),
            settings,
        }
    }

    /// Open a new push connection for `client_id`, replacing any existing one.
    pub fn start_connection(&self, client_id: ClientId) -> ConnectionHandle {
        let (transport, events) = ChannelTransport::new();
        let connection = Connection::new(client_id, self.settings.idle_timeout, transport);
        info!(
            "Starting SSE connection {} for client {}",
            connection.id(),
            connection.client_id()
        );

        self.registry.add(Arc::clone(&connection));
        spawn_idle_watchdog(&connection);

        ConnectionHandle::new(connection, events)
    }

    pub fn send_to(&self, client_id: &str, event: Event) -> bool {
        self.registry.send(client_id, &event)
    }

    pub fn close_connection(&self, client_id: &str) -> bool {
        info!("Closing SSE connection for client {client_id}");
        self.registry.close(client_id)
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::State;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_start_send_close() {
        let manager = Manager::default();
        let handle = manager.start_connection("c1".to_string());
        let connection = Arc::clone(handle.connection());
        let mut stream = Box::pin(handle.into_stream());

        // First heartbeat goes out immediately
        assert!(stream.next().await.is_some());

        assert!(manager.send_to("c1", Event::message("hello")));
        assert!(stream.next().await.is_some());

        assert!(manager.close_connection("c1"));
        assert!(stream.next().await.is_none());
        assert_eq!(connection.state(), State::Closed);
        assert!(!manager.close_connection("c1"));
        assert!(!manager.send_to("c1", Event::message("late")));
    }

    #[tokio::test]
    async fn test_restart_with_same_id_supersedes() {
        let manager = Manager::default();
        let first = manager.start_connection("c1".to_string());
        let second = manager.start_connection("c1".to_string());

        assert!(!first.connection().is_active());
        assert!(second.connection().is_active());
        assert_eq!(manager.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_client_going_away_removes_the_session() {
        let manager = Manager::default();
        let stream = manager.start_connection("c1".to_string()).into_stream();
        assert!(manager.registry().contains("c1"));

        drop(stream);

        assert!(!manager.registry().contains("c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_removes_the_session() {
        let manager = Manager::new(Settings {
            heartbeat_interval: Duration::from_secs(60),
            idle_timeout: Some(Duration::from_secs(30)),
            heartbeat_workers: 2,
        });
        let handle = manager.start_connection("c1".to_string());

        // The first heartbeat at t=0 counts as activity, the next one comes too late
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(handle.connection().state(), State::TimedOut);
        assert!(!manager.registry().contains("c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_keep_an_idle_connection_alive() {
        let manager = Manager::default();
        let handle = manager.start_connection("c1".to_string());

        tokio::time::sleep(Duration::from_secs(120)).await;

        assert!(handle.connection().is_active());
        assert!(manager.registry().contains("c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_idle_timeout_never_expires() {
        let manager = Manager::new(Settings {
            heartbeat_interval: Duration::from_secs(3600),
            idle_timeout: None,
            heartbeat_workers: 2,
        });
        let handle = manager.start_connection("c1".to_string());

        tokio::time::sleep(Duration::from_secs(600)).await;

        assert!(handle.connection().is_active());
    }
}
