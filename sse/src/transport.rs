//! The push stream a [`Connection`](crate::connection::Connection) writes to.
//!
//! The registry only needs two things from the transport: write one event and
//! end the stream, optionally with a failure reason. [`ChannelTransport`] backs
//! an axum `Sse` response with an unbounded channel, so writes never block.

use crate::error::{Error, ErrorKind};
use crate::message::{Event, EventType};
use axum::response::sse::Event as SseEvent;
use log::*;
use parking_lot::Mutex;
use std::convert::Infallible;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub type EventSender = UnboundedSender<Result<SseEvent, Infallible>>;
pub type EventReceiver = UnboundedReceiver<Result<SseEvent, Infallible>>;

pub trait Transport: Send + Sync {
    /// Push one event to the client. Must not block.
    fn write(&self, event: &Event) -> Result<(), Error>;

    /// End the stream. With a failure reason, a final `connection_closed`
    /// event is written first. Calling it again is a no-op.
    fn finish(&self, failure: Option<&str>);
}

/// Channel-backed transport feeding an SSE response body.
pub struct ChannelTransport {
    sender: Mutex<Option<EventSender>>,
}

impl ChannelTransport {
    pub fn new() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

fn encode(event: &Event) -> Result<SseEvent, Error> {
    let data = serde_json::to_string(event)?;
    Ok(SseEvent::default().event(event.event_type()).data(data))
}

impl Transport for ChannelTransport {
    fn write(&self, event: &Event) -> Result<(), Error> {
        let encoded = encode(event)?;
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or_else(|| Error::new(ErrorKind::NotActive))?;
        sender.send(Ok(encoded)).map_err(|_| {
            Error::with_source(ErrorKind::TransportWriteFailure, "stream receiver dropped")
        })
    }

    fn finish(&self, failure: Option<&str>) {
        // Dropping the sender ends the response stream.
        let Some(sender) = self.sender.lock().take() else {
            return;
        };

        if let Some(reason) = failure {
            let closing = Event::ConnectionClosed {
                reason: reason.to_string(),
            };
            match encode(&closing) {
                Ok(event) => {
                    if sender.send(Ok(event)).is_err() {
                        debug!("Stream already gone, could not deliver close reason: {reason}");
                    }
                }
                Err(e) => error!("Failed to encode connection_closed event: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_delivers_to_receiver() {
        let (transport, mut rx) = ChannelTransport::new();
        transport.write(&Event::Heartbeat).unwrap();
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn test_write_fails_once_receiver_is_dropped() {
        let (transport, rx) = ChannelTransport::new();
        drop(rx);
        let err = transport.write(&Event::Heartbeat).unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::TransportWriteFailure);
    }

    #[tokio::test]
    async fn test_finish_without_failure_just_ends_the_stream() {
        let (transport, mut rx) = ChannelTransport::new();
        transport.finish(None);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_finish_with_failure_writes_a_final_event() {
        let (transport, mut rx) = ChannelTransport::new();
        transport.finish(Some("superseded"));
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_write_after_finish_reports_not_active() {
        let (transport, _rx) = ChannelTransport::new();
        transport.finish(None);
        transport.finish(None);
        let err = transport.write(&Event::Heartbeat).unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::NotActive);
    }
}
