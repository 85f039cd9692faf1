//! Route definitions for the hub's HTTP surface.

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::health;
use crate::hub::Hub;
use crate::ws::ws_handler;

/// Creates the hub router: the WebSocket acceptance URL plus the
/// operational probes. Cross-origin upgrades are allowed.
pub fn create_router(hub: Arc<Hub>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health::health_check))
        .route("/sessions", get(health::list_sessions))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(hub)
}
