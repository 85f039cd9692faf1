//! Health and roster probes for operational integration.

use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::hub::Hub;
use crate::topology::SessionInfo;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
    /// Registered session count
    pub active_connections: usize,
    /// Uptime in seconds
    pub uptime_secs: u64,
}

/// Health check handler.
///
/// GET /health
pub async fn health_check(State(hub): State<Arc<Hub>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_connections: hub.topology().len(),
        uptime_secs: hub.uptime_secs(),
    })
}

/// Session roster response.
#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    /// Number of registered sessions
    pub count: usize,
    /// Roster snapshot
    pub sessions: Vec<SessionInfo>,
}

/// Session roster handler.
///
/// GET /sessions
pub async fn list_sessions(State(hub): State<Arc<Hub>>) -> Json<SessionsResponse> {
    let sessions = hub.topology().session_infos();
    Json(SessionsResponse {
        count: sessions.len(),
        sessions,
    })
}
