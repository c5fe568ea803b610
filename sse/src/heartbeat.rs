use crate::connection::ClientId;
use crate::message::Event;
use crate::registry::SessionRegistry;
use log::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Default period between two heartbeats for one client
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Smallest number of heartbeats allowed to run at the same time
pub const MIN_HEARTBEAT_WORKERS: usize = 2;

/// Pushes one keep-alive to one client through the registry.
pub struct HeartbeatTask {
    client_id: ClientId,
    registry: Weak<SessionRegistry>,
}

impl HeartbeatTask {
    pub fn new(client_id: ClientId, registry: Weak<SessionRegistry>) -> Self {
        Self {
            client_id,
            registry,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Run one tick. A failed send is only logged; the job keeps its schedule
    /// until the registry cancels it. Returns false once the registry is gone.
    pub fn run(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };

        // Looked up by client id: a tick in flight while its job is superseded
        // may reach the replacement connection once
        debug!("Sending heartbeat to client {}", self.client_id);
        if !registry.send(&self.client_id, &Event::Heartbeat) {
            warn!("Heartbeat to client {} was not delivered", self.client_id);
        }
        true
    }
}

/// Cancelable handle on a scheduled heartbeat job.
///
/// Cancelling never waits: a tick that is already sending may finish, but the
/// job is never run again. Dropping the handle cancels the job too.
#[derive(Debug)]
pub struct HeartbeatHandle {
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runs heartbeat jobs at a fixed rate, first tick immediately, with at most
/// `workers` ticks executing concurrently across all clients.
#[derive(Clone, Debug)]
pub struct HeartbeatScheduler {
    period: Duration,
    workers: Arc<Semaphore>,
}

impl HeartbeatScheduler {
    pub fn new(period: Duration, workers: usize) -> Self {
        let period = if period.is_zero() {
            warn!(
                "Heartbeat interval must be positive, using {:?}",
                DEFAULT_HEARTBEAT_INTERVAL
            );
            DEFAULT_HEARTBEAT_INTERVAL
        } else {
            period
        };

        Self {
            period,
            workers: Arc::new(Semaphore::new(workers.max(MIN_HEARTBEAT_WORKERS))),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn schedule(&self, task: HeartbeatTask) -> HeartbeatHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let workers = Arc::clone(&self.workers);
        let period = self.period;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Ok(_permit) = workers.acquire().await else {
                    return;
                };
                if flag.load(Ordering::Acquire) || !task.run() {
                    return;
                }
            }
        });

        HeartbeatHandle { cancelled, task }
    }
}

impl Default for HeartbeatScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL, MIN_HEARTBEAT_WORKERS)
    }
}
