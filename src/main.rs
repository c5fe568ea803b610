use log::*;
use service::{config::Config, logging::Logger, AppState};
use sse::Manager;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();

    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
    }

    let settings = config.session_settings();
    info!(
        "SSE sessions: heartbeat every {:?}, idle timeout {:?}, {} heartbeat workers",
        settings.heartbeat_interval, settings.idle_timeout, settings.heartbeat_workers
    );

    // Lives for the whole process, shared with every request through AppState
    let sse_manager = Arc::new(Manager::new(settings));
    let app_state = AppState::new(config, &sse_manager);

    if let Err(e) = web::init_server(app_state).await {
        error!("Server failed: {e}");
        std::process::exit(1);
    }
}
