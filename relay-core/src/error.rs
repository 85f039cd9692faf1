//! Error types for the Relay hub.
//!
//! One hierarchy covers routing, admission, and hook failures. Transport
//! errors terminate sessions at the transport layer and never surface here.

use thiserror::Error;

use crate::types::MessageType;

/// Errors produced by hub operations, handlers, and hooks.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The session ceiling was reached at acceptance.
    #[error("session limit reached ({limit})")]
    AdmissionRefused {
        /// The configured ceiling that was hit.
        limit: usize,
    },

    /// A topology operation referenced an unregistered session.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A message type that requires a channel arrived without one.
    #[error("channel is required for {0} messages")]
    ChannelRequired(MessageType),

    /// A message type that requires a recipient arrived without one.
    #[error("recipient is required for {0} messages")]
    RecipientRequired(MessageType),

    /// A message type that requires a payload arrived without one.
    #[error("payload is required for {0} messages")]
    PayloadRequired(MessageType),

    /// An envelope arrived with an empty type tag.
    #[error("message type is required")]
    TypeRequired,

    /// The hub is shutting down and refuses new work.
    #[error("hub is shutting down")]
    ShuttingDown,

    /// A hook rejected the envelope or session.
    #[error("hook rejected: {0}")]
    HookRejected(String),
}

/// Result alias for hub operations.
pub type Result<T> = std::result::Result<T, RelayError>;
