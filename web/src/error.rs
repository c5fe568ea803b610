use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub type Result<T> = core::result::Result<T, Error>;

/// Errors the web layer turns into HTTP responses. Session operations never
/// fail this way; they answer `Succeed!` or `Error!` instead.
#[derive(Debug, PartialEq)]
pub enum Error {
    /// The `clientId` query parameter was empty or blank.
    InvalidClientId,
}

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        match self {
            Error::InvalidClientId => write!(fmt, "clientId must not be empty"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::InvalidClientId => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
        }
    }
}
