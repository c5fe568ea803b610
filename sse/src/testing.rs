//! In-memory transport used by the unit tests.

use crate::error::{Error, ErrorKind};
use crate::message::Event;
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Recorded {
    events: Mutex<Vec<Event>>,
    finished: Mutex<Option<Option<String>>>,
    attempts: AtomicUsize,
    fail_writes: AtomicBool,
}

/// Records every event written and how the stream was finished. Clones share
/// the same record, so a test can keep one while handing another to a
/// `Connection`.
#[derive(Clone, Default)]
pub(crate) struct RecordingTransport {
    inner: Arc<Recorded>,
}

impl RecordingTransport {
    pub(crate) fn events(&self) -> Vec<Event> {
        self.inner.events.lock().clone()
    }

    pub(crate) fn heartbeats(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, Event::Heartbeat))
            .count()
    }

    /// Write attempts, including failed ones.
    pub(crate) fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// `None` while open, otherwise the failure reason the stream ended with.
    pub(crate) fn finished(&self) -> Option<Option<String>> {
        self.inner.finished.lock().clone()
    }

    pub(crate) fn fail_writes(&self) {
        self.inner.fail_writes.store(true, Ordering::SeqCst);
    }
}

impl Transport for RecordingTransport {
    fn write(&self, event: &Event) -> Result<(), Error> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::with_source(
                ErrorKind::TransportWriteFailure,
                "broken pipe",
            ));
        }
        if self.inner.finished.lock().is_some() {
            return Err(Error::new(ErrorKind::NotActive));
        }
        self.inner.events.lock().push(event.clone());
        Ok(())
    }

    fn finish(&self, failure: Option<&str>) {
        let mut finished = self.inner.finished.lock();
        if finished.is_none() {
            *finished = Some(failure.map(str::to_string));
        }
    }
}
