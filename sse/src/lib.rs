//! Server-Sent Events (SSE) session infrastructure.
//!
//! This crate keeps one long-lived push connection per client ID, keeps each
//! of them alive with periodic heartbeats and tears them down exactly once when
//! they end.
//!
//! # Architecture
//!
//! - **Single connection per client**: Registering a client ID that is already
//!   connected fails the previous connection as superseded before the new one
//!   becomes visible.
//! - **Sharded registry**: `SessionRegistry` is a `DashMap` keyed by client ID,
//!   so unrelated clients never contend on one lock, and check-and-supersede
//!   happens under the entry lock of a single key.
//! - **One cleanup path**: A connection accepts a single terminal listener (the
//!   registry), notified once on its first terminal transition, whatever caused
//!   it: completion, idle timeout, transport error or explicit close.
//! - **Heartbeats owned by the registry**: Each entry carries the handle of its
//!   heartbeat job. Only the registry cancels it, and cancelling never waits on
//!   a tick in flight.
//! - **No errors across the boundary**: Send and close report booleans; the
//!   failures behind them are logged.
//!
//! # Message Flow
//!
//! 1. Client opens `/sse/start?clientId=...`
//! 2. `Manager::start_connection` creates a `Connection` backed by a channel
//!    transport, registers it (which schedules its heartbeat) and arms its idle
//!    timeout
//! 3. The web layer turns the returned `ConnectionHandle` into an `Sse` body
//! 4. `/sse/send` and `/sse/end` go through the registry by client ID
//! 5. When the client goes away the response stream is dropped, the connection
//!    fails with a transport error and the registry removes it
//!
//! # Modules
//!
//! - `connection`: Connection state machine, idle watchdog and response stream
//! - `heartbeat`: Heartbeat job, scheduler and cancelable handle
//! - `registry`: SessionRegistry
//! - `manager`: High-level start/send/close entry point
//! - `message`: Type-safe event definitions
//! - `transport`: Push stream abstraction and its channel implementation

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod manager;
pub mod message;
pub mod registry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use manager::{Manager, Settings};
