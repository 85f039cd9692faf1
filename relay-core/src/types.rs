//! Message type vocabulary.
//!
//! The hub routes on an open string vocabulary: the known values below have
//! registered dispatch behavior, anything else round-trips untouched and is
//! default-routed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag of an [`Envelope`](crate::Envelope).
///
/// Serializes as the wire string (e.g. `"chat:private"`). Unknown strings are
/// preserved in [`MessageType::Other`] so that forwarding never loses the
/// original tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// Chat message (group semantics, synonymous with `chat:group`)
    Chat,
    /// Group chat message scoped to a channel
    GroupChat,
    /// Private chat message addressed to a user
    PrivateChat,
    /// Notification for a user or channel
    Notification,
    /// Alert notification
    Alert,
    /// Generic event
    Event,
    /// Application-defined event
    CustomEvent,
    /// Hub-synthesized: a user joined a channel
    UserJoined,
    /// Hub-synthesized: a user left a channel
    UserLeft,
    /// Typing indicator
    Typing,
    /// Presence update / channel join request
    Presence,
    /// Tombstone instructing clients to remove a message
    MessageDelete,
    /// Delivery acknowledgment
    Ack,
    /// Any type the hub has no registered behavior for
    Other(String),
}

impl MessageType {
    /// Returns the wire representation of this type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Chat => "chat",
            Self::GroupChat => "chat:group",
            Self::PrivateChat => "chat:private",
            Self::Notification => "notification",
            Self::Alert => "alert",
            Self::Event => "event",
            Self::CustomEvent => "event:custom",
            Self::UserJoined => "system:user_joined",
            Self::UserLeft => "system:user_left",
            Self::Typing => "system:typing",
            Self::Presence => "system:presence",
            Self::MessageDelete => "message:delete",
            Self::Ack => "ack",
            Self::Other(s) => s,
        }
    }

    /// Returns true if the tag is empty (a client sent `"type": ""`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Other(s) if s.is_empty())
    }
}

impl From<&str> for MessageType {
    fn from(s: &str) -> Self {
        match s {
            "chat" => Self::Chat,
            "chat:group" => Self::GroupChat,
            "chat:private" => Self::PrivateChat,
            "notification" => Self::Notification,
            "alert" => Self::Alert,
            "event" => Self::Event,
            "event:custom" => Self::CustomEvent,
            "system:user_joined" => Self::UserJoined,
            "system:user_left" => Self::UserLeft,
            "system:typing" => Self::Typing,
            "system:presence" => Self::Presence,
            "message:delete" => Self::MessageDelete,
            "ack" => Self::Ack,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for MessageType {
    fn from(s: String) -> Self {
        match Self::from(s.as_str()) {
            Self::Other(_) => Self::Other(s),
            known => known,
        }
    }
}

impl From<MessageType> for String {
    fn from(t: MessageType) -> Self {
        match t {
            MessageType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
