//! WebSocket acceptance.
//!
//! `GET /ws?user_id=...` upgrades the connection and hands the socket to the
//! transport loop. The ceiling is checked before the upgrade completes;
//! deployments that hit it see a plain `503` instead of an
//! upgrade-then-close.

use axum::{
    extract::{
        Query, State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::hub::Hub;
use crate::session::{Session, SessionId};
use crate::transport;

/// Query parameters for the acceptance URL.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// User identity for the session; synthesized when absent.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(hub): State<Arc<Hub>>,
) -> Result<Response, ApiError> {
    if hub.is_shutting_down() {
        return Err(ApiError::ShuttingDown);
    }
    // Advisory pre-upgrade check; register() re-checks authoritatively.
    if hub.topology().len() >= hub.config().max_connections {
        warn!(
            limit = hub.config().max_connections,
            "upgrade refused, session ceiling reached"
        );
        return Err(ApiError::CapacityExhausted);
    }

    let user_id = query
        .user_id
        .filter(|u| !u.is_empty())
        .unwrap_or_else(generate_user_id);

    let write_buffer_size = hub.config().write_buffer_size;
    Ok(ws
        .write_buffer_size(write_buffer_size)
        .on_upgrade(move |socket| accept_session(hub, socket, user_id)))
}

/// Registers a session for the upgraded socket and runs its transport loop.
async fn accept_session(hub: Arc<Hub>, socket: WebSocket, user_id: String) {
    let session_id = SessionId::generate();
    let (session, outbox_rx) = Session::new(session_id, user_id, hub.config().outbox_capacity);

    // Shutdown may have slipped in since the pre-upgrade check; bail before
    // registering so no registered session is ever torn down hook-less.
    if hub.is_shutting_down() {
        return;
    }
    if let Err(error) = hub.topology().register(session.clone()) {
        // Lost the race between the pre-upgrade check and registration;
        // dropping the socket closes the transport. Neither hook runs.
        warn!(session_id = %session.id(), %error, "admission refused after upgrade");
        return;
    }
    if hub.is_shutting_down() {
        // Shutdown fired between the check above and registration. The
        // session is registered, so close it and let the supervised
        // teardown below run the disconnect hook.
        session.close();
    }

    info!(
        session_id = %session.id(),
        user_id = %session.user_id(),
        "session registered"
    );
    hub.hooks().run_connect(&session).await;

    transport::run_session(hub, socket, session, outbox_rx).await;
}

fn generate_user_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("user_{}", &hex[..8])
}
