//! The HTTP/WS surface: `POST /api/streaming/start/{device_id}`,
//! `/stop/{device_id}`, and `GET /ws`. Everything else the browser UI
//! needs (scan/list, SQLite-backed config) is an out-of-core
//! collaborator and has no handlers here.

mod handlers;
mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use ws::ws_handler;

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/streaming/start/:device_id", post(handlers::start_streaming))
        .route("/api/streaming/stop/:device_id", post(handlers::stop_streaming))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
