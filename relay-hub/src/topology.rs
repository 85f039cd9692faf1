//! The topology registry: sessions, users, and channel membership.
//!
//! One readers-writer lock protects the whole index so the session/channel
//! bi-map can never be observed half-updated. Every read returns a snapshot
//! (cloned ids or `Arc<Session>` handles); callers enqueue onto outboxes
//! only after the guard is dropped.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use relay_core::{RelayError, Result};

use crate::session::{Session, SessionId};

/// Roster entry describing one registered session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Session id
    pub id: SessionId,
    /// Owning user id
    pub user_id: String,
    /// Channels the session has joined
    pub channels: Vec<String>,
    /// Acceptance timestamp (Unix seconds)
    pub connected_at: i64,
}

#[derive(Debug, Default)]
struct Inner {
    /// session id -> session
    sessions: HashMap<SessionId, Arc<Session>>,
    /// user id -> session ids (a user may hold several sessions)
    users: HashMap<String, Vec<SessionId>>,
    /// channel name -> session ids, in subscription order
    channels: HashMap<String, Vec<SessionId>>,
}

/// Registry of all registered sessions and their channel memberships.
#[derive(Debug)]
pub struct Topology {
    max_sessions: usize,
    inner: RwLock<Inner>,
}

impl Topology {
    /// Creates a new topology with the given admission ceiling.
    #[must_use]
    pub fn new(max_sessions: usize) -> Self {
        Self {
            max_sessions,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Registers a session.
    ///
    /// Fails with [`RelayError::AdmissionRefused`] once the ceiling is
    /// reached; the session is then not visible anywhere in the index.
    pub fn register(&self, session: Arc<Session>) -> Result<()> {
        let mut inner = self.inner.write();

        if inner.sessions.len() >= self.max_sessions {
            return Err(RelayError::AdmissionRefused {
                limit: self.max_sessions,
            });
        }

        let id = session.id().clone();
        inner
            .users
            .entry(session.user_id().to_string())
            .or_default()
            .push(id.clone());
        inner.sessions.insert(id, session);
        Ok(())
    }

    /// Unregisters a session, removing it from every channel it joined.
    ///
    /// Idempotent: the session is returned exactly once, on the call that
    /// actually removed it. The supervisor keys the disconnect hook off that
    /// single yield.
    pub fn unregister(&self, id: &SessionId) -> Option<Arc<Session>> {
        let mut inner = self.inner.write();
        let session = inner.sessions.remove(id)?;

        if let Some(ids) = inner.users.get_mut(session.user_id()) {
            ids.retain(|sid| sid != id);
            if ids.is_empty() {
                inner.users.remove(session.user_id());
            }
        }

        for channel in session.subscriptions() {
            Self::remove_member(&mut inner, &channel, id);
        }
        session.clear_subscriptions();

        Some(session)
    }

    /// Subscribes a session to a channel, creating the channel if absent.
    /// A no-op when already subscribed.
    pub fn subscribe(&self, id: &SessionId, channel: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| RelayError::SessionNotFound(id.to_string()))?;

        let members = inner.channels.entry(channel.to_string()).or_default();
        if !members.contains(id) {
            members.push(id.clone());
        }
        session.add_subscription(channel);
        Ok(())
    }

    /// Unsubscribes a session from a channel, deleting the channel entry
    /// once its member list is empty. A no-op when not subscribed.
    pub fn unsubscribe(&self, id: &SessionId, channel: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| RelayError::SessionNotFound(id.to_string()))?;

        session.remove_subscription(channel);
        Self::remove_member(&mut inner, channel, id);
        Ok(())
    }

    /// Returns the session with the given id, if registered.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.inner.read().sessions.get(id).cloned()
    }

    /// Returns a snapshot of every session belonging to the user.
    #[must_use]
    pub fn sessions_of_user(&self, user_id: &str) -> Vec<Arc<Session>> {
        let inner = self.inner.read();
        inner
            .users
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.sessions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns a snapshot of every session subscribed to the channel.
    #[must_use]
    pub fn sessions_of_channel(&self, channel: &str) -> Vec<Arc<Session>> {
        let inner = self.inner.read();
        inner
            .channels
            .get(channel)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.sessions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the distinct user ids with at least one session in the
    /// channel, in first-seen (subscription) order.
    #[must_use]
    pub fn active_users_of_channel(&self, channel: &str) -> Vec<String> {
        let inner = self.inner.read();
        let Some(ids) = inner.channels.get(channel) else {
            return Vec::new();
        };

        let mut users = Vec::new();
        for id in ids {
            if let Some(session) = inner.sessions.get(id) {
                if !users.iter().any(|u| u == session.user_id()) {
                    users.push(session.user_id().to_string());
                }
            }
        }
        users
    }

    /// Returns a snapshot of every registered session.
    #[must_use]
    pub fn snapshot_all(&self) -> Vec<Arc<Session>> {
        self.inner.read().sessions.values().cloned().collect()
    }

    /// Returns a roster snapshot for the operational surface.
    #[must_use]
    pub fn session_infos(&self) -> Vec<SessionInfo> {
        self.inner
            .read()
            .sessions
            .values()
            .map(|session| {
                let mut channels: Vec<String> = session.subscriptions().into_iter().collect();
                channels.sort();
                SessionInfo {
                    id: session.id().clone(),
                    user_id: session.user_id().to_string(),
                    channels,
                    connected_at: session.created_at().timestamp(),
                }
            })
            .collect()
    }

    /// Returns the number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    /// Returns true if no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().sessions.is_empty()
    }

    fn remove_member(inner: &mut Inner, channel: &str, id: &SessionId) {
        if let Some(members) = inner.channels.get_mut(channel) {
            members.retain(|sid| sid != id);
            if members.is_empty() {
                inner.channels.remove(channel);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    fn register_session(topology: &Topology, user: &str) -> Arc<Session> {
        let (session, _rx) = Session::new(SessionId::generate(), user, 8);
        // rx intentionally dropped; these tests never drain outboxes
        topology.register(session.clone()).unwrap();
        session
    }

    #[test]
    fn test_register_and_len() {
        let topology = Topology::new(10);
        assert!(topology.is_empty());

        register_session(&topology, "alice");
        register_session(&topology, "alice");
        assert_eq!(topology.len(), 2);
        assert_eq!(topology.sessions_of_user("alice").len(), 2);
    }

    #[test]
    fn test_register_refused_at_ceiling() {
        let topology = Topology::new(2);
        register_session(&topology, "a");
        register_session(&topology, "b");

        let (third, _rx) = Session::new(SessionId::generate(), "c", 8);
        let err = topology.register(third).unwrap_err();
        assert!(matches!(err, RelayError::AdmissionRefused { limit: 2 }));
        assert_eq!(topology.len(), 2);
    }

    #[test]
    fn test_ceiling_frees_up_after_unregister() {
        let topology = Topology::new(1);
        let first = register_session(&topology, "a");

        let (second, _rx) = Session::new(SessionId::generate(), "b", 8);
        assert!(topology.register(second.clone()).is_err());

        topology.unregister(first.id());
        assert!(topology.register(second).is_ok());
    }

    #[test]
    fn test_subscribe_updates_both_sides() {
        let topology = Topology::new(10);
        let session = register_session(&topology, "alice");

        topology.subscribe(session.id(), "general").unwrap();

        assert!(session.is_subscribed("general"));
        assert_eq!(topology.sessions_of_channel("general").len(), 1);
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let topology = Topology::new(10);
        let session = register_session(&topology, "alice");

        topology.subscribe(session.id(), "general").unwrap();
        topology.subscribe(session.id(), "general").unwrap();

        assert_eq!(topology.sessions_of_channel("general").len(), 1);
        assert_eq!(session.subscriptions().len(), 1);
    }

    #[test]
    fn test_unsubscribe_removes_empty_channel() {
        let topology = Topology::new(10);
        let session = register_session(&topology, "alice");

        topology.subscribe(session.id(), "general").unwrap();
        topology.unsubscribe(session.id(), "general").unwrap();

        assert!(!session.is_subscribed("general"));
        assert!(topology.sessions_of_channel("general").is_empty());
        assert!(topology.active_users_of_channel("general").is_empty());
    }

    #[test]
    fn test_unsubscribe_unknown_channel_is_noop() {
        let topology = Topology::new(10);
        let session = register_session(&topology, "alice");

        topology.unsubscribe(session.id(), "nowhere").unwrap();
        assert!(session.subscriptions().is_empty());
    }

    #[test]
    fn test_subscribe_unknown_session_fails() {
        let topology = Topology::new(10);
        let unknown = SessionId::generate();
        let err = topology.subscribe(&unknown, "general").unwrap_err();
        assert!(matches!(err, RelayError::SessionNotFound(_)));
    }

    #[test]
    fn test_unregister_cleans_every_channel() {
        let topology = Topology::new(10);
        let session = register_session(&topology, "alice");
        topology.subscribe(session.id(), "general").unwrap();
        topology.subscribe(session.id(), "dev").unwrap();

        let removed = topology.unregister(session.id()).unwrap();
        assert!(Arc::ptr_eq(&removed, &session));

        assert!(topology.sessions_of_channel("general").is_empty());
        assert!(topology.sessions_of_channel("dev").is_empty());
        assert!(topology.sessions_of_user("alice").is_empty());
        assert!(session.subscriptions().is_empty());
    }

    #[test]
    fn test_unregister_yields_session_exactly_once() {
        let topology = Topology::new(10);
        let session = register_session(&topology, "alice");

        assert!(topology.unregister(session.id()).is_some());
        assert!(topology.unregister(session.id()).is_none());
    }

    #[test]
    fn test_active_users_first_seen_order_no_duplicates() {
        let topology = Topology::new(10);
        let alice1 = register_session(&topology, "alice");
        let bob = register_session(&topology, "bob");
        let alice2 = register_session(&topology, "alice");

        topology.subscribe(alice1.id(), "dev").unwrap();
        topology.subscribe(bob.id(), "dev").unwrap();
        topology.subscribe(alice2.id(), "dev").unwrap();

        assert_eq!(topology.active_users_of_channel("dev"), vec!["alice", "bob"]);
    }

    #[test]
    fn test_sessions_of_user_with_no_sessions() {
        let topology = Topology::new(10);
        assert!(topology.sessions_of_user("ghost").is_empty());
    }

    #[test]
    fn test_session_infos_snapshot() {
        let topology = Topology::new(10);
        let session = register_session(&topology, "alice");
        topology.subscribe(session.id(), "general").unwrap();

        let infos = topology.session_infos();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].user_id, "alice");
        assert_eq!(infos[0].channels, vec!["general"]);
    }
}
