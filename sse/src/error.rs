//! Error types for the `sse` crate.
//!
//! Follows the same pattern as the other crates in the workspace: a root `Error`
//! struct holding an `ErrorKind` and an optional source for chaining. None of
//! these errors cross the registry boundary; the registry logs them and reports
//! a boolean to its callers.

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Kinds of failures a push connection can run into.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// A newer connection registered under the same client ID.
    DuplicateConnection,
    /// Writing to the underlying stream failed.
    TransportWriteFailure,
    /// No successful write happened within the idle window.
    IdleTimeout,
    /// The underlying stream reported an error or went away.
    TransportError,
    /// A write was attempted on a connection that already reached a terminal state.
    NotActive,
    /// The event could not be serialized.
    Encoding,
}

impl Error {
    pub fn new(error_kind: ErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
        }
    }

    pub fn with_source<E>(error_kind: ErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self {
            source: Some(source.into()),
            error_kind,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let description = match self {
            ErrorKind::DuplicateConnection => "superseded by new connection",
            ErrorKind::TransportWriteFailure => "transport write failed",
            ErrorKind::IdleTimeout => "idle timeout elapsed",
            ErrorKind::TransportError => "transport error",
            ErrorKind::NotActive => "connection is no longer active",
            ErrorKind::Encoding => "event encoding failed",
        };
        write!(f, "{description}")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.error_kind, source),
            None => write!(f, "{}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Encoding, err)
    }
}
