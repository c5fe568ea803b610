use crate::controller::{health_check_controller, sse_controller};
use crate::sse::handler::sse_handler;
use crate::AppState;
use axum::http::{HeaderValue, Method};
use axum::{routing::get, Router};
use log::*;
use service::config::Config;
use tower_http::cors::CorsLayer;

pub fn define_routes(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.config);

    Router::new()
        .merge(health_routes(app_state.clone()))
        .merge(sse_routes(app_state))
        .layer(cors)
}

fn health_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check_controller::health_check))
        .with_state(app_state)
}

fn sse_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/sse/start", get(sse_handler))
        .route(
            "/sse/send",
            get(sse_controller::send).post(sse_controller::send),
        )
        .route(
            "/sse/end",
            get(sse_controller::close).post(sse_controller::close),
        )
        .with_state(app_state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {origin}: {e}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
}
