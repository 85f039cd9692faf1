//! Per-session state and the bounded outbox.
//!
//! A [`Session`] is one accepted client transport instance. The outbox is a
//! bounded multi-producer single-consumer queue drained by the session's
//! writer task; producers never block, and overflow drops at the destination.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use relay_core::Envelope;

/// Unique session identifier, hub-assigned at acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a new unique session ID.
    #[must_use]
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("sess_{}", &hex[..12]))
    }

    /// Returns the inner ID string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Outcome of a non-blocking outbox enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// The envelope was accepted onto the outbox.
    Delivered,
    /// The outbox was at capacity; the envelope was dropped.
    DroppedFull,
    /// The session is terminal; the envelope was dropped.
    DroppedClosed,
}

impl EnqueueResult {
    /// Returns true if the envelope was accepted.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// State of a single relay session.
///
/// Shared between the reader, the writer, the dispatcher, and the topology;
/// each mutable field carries its own synchronization so no caller ever holds
/// a session-wide lock across an await point.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    user_id: String,
    /// Channels this session has joined. Mutated only by the topology, under
    /// its write lock.
    subscriptions: RwLock<HashSet<String>>,
    /// Scratch space for hooks.
    extra: DashMap<String, serde_json::Value>,
    created_at: DateTime<Utc>,
    last_seen: RwLock<DateTime<Utc>>,
    outbox: mpsc::Sender<Envelope>,
    closed: watch::Sender<bool>,
}

impl Session {
    /// Creates a new session with a bounded outbox.
    ///
    /// Returns the session and the receiving half of the outbox, which the
    /// writer task owns.
    #[must_use]
    pub fn new(
        id: SessionId,
        user_id: impl Into<String>,
        outbox_capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(outbox_capacity);
        let (closed, _) = watch::channel(false);
        let now = Utc::now();

        let session = Arc::new(Self {
            id,
            user_id: user_id.into(),
            subscriptions: RwLock::new(HashSet::new()),
            extra: DashMap::new(),
            created_at: now,
            last_seen: RwLock::new(now),
            outbox: tx,
            closed,
        });

        (session, rx)
    }

    /// Returns the session ID.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the user this session belongs to.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last-seen timestamp.
    #[must_use]
    pub fn last_seen(&self) -> DateTime<Utc> {
        *self.last_seen.read()
    }

    /// Advances the last-seen timestamp to now.
    pub fn touch(&self) {
        *self.last_seen.write() = Utc::now();
    }

    /// Returns the hook scratch map.
    #[must_use]
    pub fn extra(&self) -> &DashMap<String, serde_json::Value> {
        &self.extra
    }

    /// Returns a snapshot of the channels this session has joined.
    #[must_use]
    pub fn subscriptions(&self) -> HashSet<String> {
        self.subscriptions.read().clone()
    }

    /// Returns true if the session has joined the channel.
    #[must_use]
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.subscriptions.read().contains(channel)
    }

    pub(crate) fn add_subscription(&self, channel: &str) {
        self.subscriptions.write().insert(channel.to_string());
    }

    pub(crate) fn remove_subscription(&self, channel: &str) {
        self.subscriptions.write().remove(channel);
    }

    pub(crate) fn clear_subscriptions(&self) {
        self.subscriptions.write().clear();
    }

    /// Enqueues an envelope for transmission, never blocking.
    ///
    /// A full outbox drops the envelope for this destination; a terminal
    /// session drops unconditionally. Callers decide whether to log.
    pub fn enqueue(&self, envelope: Envelope) -> EnqueueResult {
        if self.is_closed() {
            return EnqueueResult::DroppedClosed;
        }
        match self.outbox.try_send(envelope) {
            Ok(()) => EnqueueResult::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => EnqueueResult::DroppedFull,
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueResult::DroppedClosed,
        }
    }

    /// Transitions the session to terminal and unblocks the writer.
    /// Idempotent.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Returns true once the session is terminal.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Returns a receiver that resolves once the session is terminal.
    #[must_use]
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}
