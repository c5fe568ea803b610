use crate::params::sse::ClientParams;
use crate::{AppState, Error};
use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use futures::Stream;
use log::*;
use std::convert::Infallible;

/// SSE handler that establishes a long-lived connection for one client.
/// Opening a second connection with the same clientId replaces the first.
/// No axum keep-alive is configured: the session manager pushes its own heartbeats.
pub(crate) async fn sse_handler(
    State(app_state): State<AppState>,
    Query(params): Query<ClientParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Error> {
    let client_id = params.client_id()?;
    debug!("Establishing SSE connection for client {client_id}");

    let handle = app_state.sse_manager.start_connection(client_id);

    // The stream ends when the connection does; dropping it early (client gone)
    // fails the connection and removes it from the registry
    Ok(Sse::new(handle.into_stream()))
}
