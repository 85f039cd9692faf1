//! # Relay Hub
//!
//! Real-time WebSocket message relay: sessions, channel subscriptions, and
//! user-keyed fan-out with bounded per-session buffering.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Relay Hub                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐                  │
//! │  │ Session  │   │ Session  │   │ Session  │   ...            │
//! │  │ rd ─ wr  │   │ rd ─ wr  │   │ rd ─ wr  │                  │
//! │  └────┬─────┘   └────┬─────┘   └────┬─────┘                  │
//! │       └──────────────┼──────────────┘                        │
//! │                      ▼                                       │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                  Dispatch queue (bounded)              │  │
//! │  └───────────────────────┬────────────────────────────────┘  │
//! │                          ▼                                   │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//! │  │ Handler table│──▶│   Topology   │──▶│ Outboxes (bounded│  │
//! │  │ + hooks      │   │   registry   │   │ per session)     │  │
//! │  └──────────────┘   └──────────────┘   └──────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Readers feed one shared bounded queue; dispatcher workers route each
//! envelope by type through the immutable handler table and enqueue onto
//! destination outboxes. A slow consumer overflows only its own outbox;
//! delivery is best-effort to the sessions present at dispatch time.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
mod dispatch;
pub mod error;
pub mod handlers;
pub mod health;
pub mod hooks;
pub mod hub;
pub mod routes;
pub mod session;
pub mod shutdown;
pub mod topology;
mod transport;
pub mod ws;

pub use config::HubConfig;
pub use error::ApiError;
pub use handlers::MessageHandler;
pub use hooks::{DispatchHook, Hooks, SessionHook};
pub use hub::{Hub, HubBuilder};
pub use routes::create_router;
pub use session::{EnqueueResult, Session, SessionId};
pub use shutdown::ShutdownController;
pub use topology::{SessionInfo, Topology};
