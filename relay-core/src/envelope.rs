//! The wire envelope.
//!
//! A single JSON shape is exchanged in both directions. Ingress frames are
//! normalized (id, timestamp, sender filled in) before dispatch; synthesized
//! envelopes carry only the defined keys.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::types::MessageType;

/// The message shape exchanged on the wire.
///
/// `recipient` and `channel` are addressing fields: a non-empty `recipient`
/// names a user (every session of that user is a destination), a non-empty
/// `channel` names a broadcast group. Unknown JSON keys land in `rest` and
/// are re-emitted verbatim when the envelope is forwarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Producer-assigned message id; generated on ingress if empty.
    #[serde(default)]
    pub id: String,

    /// Dispatch type tag.
    #[serde(rename = "type")]
    pub kind: MessageType,

    /// Originating user id; overridden on ingress if empty.
    #[serde(default)]
    pub sender: String,

    /// Destination user id for direct routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    /// Destination channel for group routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Type-specific fields, opaque to the hub.
    #[serde(default)]
    pub payload: Map<String, Value>,

    /// Unix timestamp in seconds; assigned on ingress if zero.
    #[serde(default)]
    pub timestamp: i64,

    /// Free-form metadata, opaque to the hub.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,

    /// Unknown keys, preserved for verbatim forwarding.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl Envelope {
    /// Creates an empty envelope of the given type.
    #[must_use]
    pub fn new(kind: MessageType) -> Self {
        Self {
            id: String::new(),
            kind,
            sender: String::new(),
            recipient: None,
            channel: None,
            payload: Map::new(),
            timestamp: 0,
            metadata: None,
            rest: Map::new(),
        }
    }

    /// Creates a hub-synthesized envelope: sender `"system"`, fresh id,
    /// current timestamp.
    #[must_use]
    pub fn system(kind: MessageType) -> Self {
        let mut envelope = Self::new(kind);
        envelope.id = generate_message_id();
        envelope.sender = "system".to_string();
        envelope.timestamp = Utc::now().timestamp();
        envelope
    }

    /// Sets the channel.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Sets the recipient.
    #[must_use]
    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    /// Inserts one payload field.
    #[must_use]
    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Returns the channel if present and non-empty.
    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref().filter(|c| !c.is_empty())
    }

    /// Returns the recipient if present and non-empty.
    #[must_use]
    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref().filter(|r| !r.is_empty())
    }

    /// Returns the string value of a payload field, if any.
    #[must_use]
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Normalizes an ingress envelope: assigns an id if empty, the current
    /// timestamp if zero, and `fallback_sender` if the sender is empty.
    pub fn normalize(&mut self, fallback_sender: &str) {
        if self.id.is_empty() {
            self.id = generate_message_id();
        }
        if self.timestamp == 0 {
            self.timestamp = Utc::now().timestamp();
        }
        if self.sender.is_empty() {
            self.sender = fallback_sender.to_string();
        }
    }
}

/// Generates a unique message id.
#[must_use]
pub fn generate_message_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}
