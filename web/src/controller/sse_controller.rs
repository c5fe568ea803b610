use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use log::*;
use sse::message::Event;

use crate::params::sse::{ClientParams, SendParams};
use crate::{AppState, Error};

const SUCCEED: &str = "Succeed!";
const FAILED: &str = "Error!";

fn outcome(succeeded: bool) -> (StatusCode, &'static str) {
    (StatusCode::OK, if succeeded { SUCCEED } else { FAILED })
}

/// GET|POST push a message to one connected client
pub async fn send(
    State(app_state): State<AppState>,
    Query(params): Query<SendParams>,
) -> Result<impl IntoResponse, Error> {
    let (client_id, message) = params.into_parts()?;
    let payload = message.unwrap_or_else(|| Utc::now().timestamp_millis().to_string());
    debug!("Pushing message to SSE client {client_id}");

    Ok(outcome(
        app_state
            .sse_manager
            .send_to(&client_id, Event::message(payload)),
    ))
}

/// GET|POST end a client's SSE connection
pub async fn close(
    State(app_state): State<AppState>,
    Query(params): Query<ClientParams>,
) -> Result<impl IntoResponse, Error> {
    let client_id = params.client_id()?;
    info!("Close requested for SSE client {client_id}");

    Ok(outcome(app_state.sse_manager.close_connection(&client_id)))
}
