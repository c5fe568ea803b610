use serde::Serialize;

/// Trait for getting the SSE event type name
pub trait EventType {
    fn event_type(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// Keep-alive pushed by the heartbeat job
    #[serde(rename = "heartbeat")]
    Heartbeat,

    /// Application payload pushed to one client
    #[serde(rename = "message")]
    Message { payload: String },

    /// Last event written before a stream is ended with a failure
    #[serde(rename = "connection_closed")]
    ConnectionClosed { reason: String },
}

impl EventType for Event {
    fn event_type(&self) -> &'static str {
        match self {
            Event::Heartbeat => "heartbeat",
            Event::Message { .. } => "message",
            Event::ConnectionClosed { .. } => "connection_closed",
        }
    }
}

impl Event {
    pub fn message(payload: impl Into<String>) -> Self {
        Event::Message {
            payload: payload.into(),
        }
    }
}
