use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::controller::ApiResponse;
use crate::AppState;

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    live_sessions: usize,
}

/// GET liveness of the API router plus the number of connected SSE clients
pub async fn health_check(State(app_state): State<AppState>) -> impl IntoResponse {
    let health = Health {
        status: "healthy",
        live_sessions: app_state.sse_manager.registry().len(),
    };
    (
        StatusCode::OK,
        Json(ApiResponse::new(StatusCode::OK.into(), health)),
    )
}
