//! The hub: topology, handler table, hooks, and fan-out primitives.
//!
//! Handlers receive the hub by reference instead of reaching for a global;
//! everything they can do goes through the methods here or the topology's
//! public operations.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use relay_core::{Envelope, MessageType, RelayError, Result};

use crate::config::HubConfig;
use crate::dispatch::DispatchItem;
use crate::handlers::{self, MessageHandler};
use crate::hooks::Hooks;
use crate::session::{EnqueueResult, Session, SessionId};
use crate::shutdown::ShutdownController;
use crate::topology::Topology;

/// The relay hub.
///
/// Owns the topology, the immutable handler table, the hook table, and the
/// shared dispatch queue. Constructed through [`Hub::builder`]; the handler
/// and hook tables cannot change after `build`.
pub struct Hub {
    config: HubConfig,
    topology: Topology,
    handlers: HashMap<MessageType, Arc<dyn MessageHandler>>,
    hooks: Hooks,
    dispatch_tx: mpsc::Sender<DispatchItem>,
    dispatch_rx: Mutex<Option<mpsc::Receiver<DispatchItem>>>,
    shutdown: ShutdownController,
    started_at: DateTime<Utc>,
}

impl Hub {
    /// Starts building a hub with the default handler table installed.
    #[must_use]
    pub fn builder(config: HubConfig) -> HubBuilder {
        HubBuilder {
            config,
            handlers: handlers::default_handlers(),
            hooks: Hooks::new(),
        }
    }

    /// Returns the hub configuration.
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Returns the topology registry.
    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Returns the hook table.
    #[must_use]
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Returns the shutdown controller shared by all hub tasks.
    #[must_use]
    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Returns seconds since the hub was built.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        u64::try_from((Utc::now() - self.started_at).num_seconds()).unwrap_or(0)
    }

    /// Returns true once shutdown has been initiated.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_initiated()
    }

    /// Broadcasts the terminal signal and closes every registered session.
    ///
    /// Readers and writers observe the signal and exit; each session's
    /// teardown then runs its disconnect hook. No new sessions are accepted
    /// afterwards.
    pub fn initiate_shutdown(&self) {
        self.shutdown.initiate();
        for session in self.topology.snapshot_all() {
            session.close();
        }
    }

    pub(crate) fn lookup_handler(&self, kind: &MessageType) -> Option<Arc<dyn MessageHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub(crate) fn take_dispatch_rx(&self) -> Option<mpsc::Receiver<DispatchItem>> {
        self.dispatch_rx.lock().take()
    }

    /// Places an inbound envelope on the shared dispatch queue.
    ///
    /// Blocks the calling reader when the queue is full; this is the hub's
    /// global admission control. A blocked reader still observes shutdown.
    pub(crate) async fn enqueue_dispatch(
        &self,
        session: Arc<Session>,
        envelope: Envelope,
    ) -> Result<()> {
        let item = DispatchItem { session, envelope };
        tokio::select! {
            () = self.shutdown.wait_for_shutdown() => Err(RelayError::ShuttingDown),
            result = self.dispatch_tx.send(item) => {
                result.map_err(|_| RelayError::ShuttingDown)
            }
        }
    }

    /// Enqueues an envelope onto one session's outbox.
    pub fn send_to_session(&self, id: &SessionId, envelope: &Envelope) -> Result<EnqueueResult> {
        let session = self
            .topology
            .get(id)
            .ok_or_else(|| RelayError::SessionNotFound(id.to_string()))?;
        Ok(session.enqueue(envelope.clone()))
    }

    /// Fans out to every session of a user. Returns the delivered count.
    pub fn send_to_user(
        &self,
        user_id: &str,
        envelope: &Envelope,
        exclude: Option<&SessionId>,
    ) -> usize {
        let targets = self.topology.sessions_of_user(user_id);
        self.fan_out(&targets, envelope, exclude)
    }

    /// Fans out to every session subscribed to a channel. Returns the
    /// delivered count.
    pub fn send_to_channel(
        &self,
        channel: &str,
        envelope: &Envelope,
        exclude: Option<&SessionId>,
    ) -> usize {
        let targets = self.topology.sessions_of_channel(channel);
        self.fan_out(&targets, envelope, exclude)
    }

    /// Fans out to every registered session. Returns the delivered count.
    pub fn broadcast_all(&self, envelope: &Envelope) -> usize {
        let targets = self.topology.snapshot_all();
        self.fan_out(&targets, envelope, None)
    }

    /// Enqueues onto each target outbox. Per-destination failures are logged
    /// and never stop the loop: a slow consumer degrades only its own
    /// stream.
    fn fan_out(
        &self,
        targets: &[Arc<Session>],
        envelope: &Envelope,
        exclude: Option<&SessionId>,
    ) -> usize {
        let mut delivered = 0;
        for session in targets {
            if exclude.is_some_and(|id| id == session.id()) {
                continue;
            }
            match session.enqueue(envelope.clone()) {
                EnqueueResult::Delivered => delivered += 1,
                EnqueueResult::DroppedFull => {
                    warn!(
                        session_id = %session.id(),
                        message_id = %envelope.id,
                        "outbox full, envelope dropped"
                    );
                }
                EnqueueResult::DroppedClosed => {
                    debug!(
                        session_id = %session.id(),
                        message_id = %envelope.id,
                        "session terminal, envelope dropped"
                    );
                }
            }
        }
        delivered
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("config", &self.config)
            .field("sessions", &self.topology.len())
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

/// Builder assembling a hub's handler and hook tables before first use.
pub struct HubBuilder {
    config: HubConfig,
    handlers: HashMap<MessageType, Arc<dyn MessageHandler>>,
    hooks: Hooks,
}

impl HubBuilder {
    /// Registers (or overrides) the handler for a message type.
    #[must_use]
    pub fn handler(mut self, kind: MessageType, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Removes the handler for a message type, restoring default routing
    /// for it.
    #[must_use]
    pub fn without_handler(mut self, kind: &MessageType) -> Self {
        self.handlers.remove(kind);
        self
    }

    /// Installs the hook table.
    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Builds the hub.
    #[must_use]
    pub fn build(self) -> Arc<Hub> {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(self.config.dispatch_queue_capacity);
        let topology = Topology::new(self.config.max_connections);

        Arc::new(Hub {
            config: self.config,
            topology,
            handlers: self.handlers,
            hooks: self.hooks,
            dispatch_tx,
            dispatch_rx: Mutex::new(Some(dispatch_rx)),
            shutdown: ShutdownController::new(),
            started_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_hub() -> Arc<Hub> {
        Hub::builder(HubConfig {
            outbox_capacity: 4,
            ..HubConfig::default()
        })
        .build()
    }

    fn join(hub: &Hub, user: &str, channel: Option<&str>) -> (Arc<Session>, mpsc::Receiver<Envelope>) {
        let (session, rx) = Session::new(SessionId::generate(), user, hub.config().outbox_capacity);
        hub.topology().register(session.clone()).unwrap();
        if let Some(channel) = channel {
            hub.topology().subscribe(session.id(), channel).unwrap();
        }
        (session, rx)
    }

    #[tokio::test]
    async fn test_send_to_channel_excludes_sender() {
        let hub = test_hub();
        let (a, mut rx_a) = join(&hub, "alice", Some("general"));
        let (_b, mut rx_b) = join(&hub, "bob", Some("general"));

        let envelope = Envelope::system(MessageType::GroupChat).with_channel("general");
        let delivered = hub.send_to_channel("general", &envelope, Some(a.id()));

        assert_eq!(delivered, 1);
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_user_reaches_every_device() {
        let hub = test_hub();
        let (_p, mut rx_p) = join(&hub, "u", None);
        let (_q, mut rx_q) = join(&hub, "u", None);
        let (_r, mut rx_r) = join(&hub, "v", None);

        let envelope = Envelope::system(MessageType::PrivateChat).with_recipient("u");
        let delivered = hub.send_to_user("u", &envelope, None);

        assert_eq!(delivered, 2);
        assert!(rx_p.try_recv().is_ok());
        assert!(rx_q.try_recv().is_ok());
        assert!(rx_r.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fan_out_to_absent_user_delivers_nowhere() {
        let hub = test_hub();
        let envelope = Envelope::system(MessageType::PrivateChat).with_recipient("ghost");
        assert_eq!(hub.send_to_user("ghost", &envelope, None), 0);
    }

    #[tokio::test]
    async fn test_fan_out_survives_full_outbox() {
        let hub = test_hub();
        let (_x, _rx_x) = join(&hub, "x", Some("general"));
        let (_y, mut rx_y) = join(&hub, "y", Some("general"));

        // Fill x's outbox (capacity 4) without draining it.
        let filler = Envelope::system(MessageType::Chat).with_channel("general");
        for _ in 0..4 {
            hub.send_to_channel("general", &filler, None);
        }
        while rx_y.try_recv().is_ok() {}

        // The next broadcast drops for x but still reaches y.
        let delivered = hub.send_to_channel("general", &filler, None);
        assert_eq!(delivered, 1);
        assert!(rx_y.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_send_to_session_unknown_id() {
        let hub = test_hub();
        let unknown = SessionId::generate();
        let envelope = Envelope::system(MessageType::Ack);
        assert!(hub.send_to_session(&unknown, &envelope).is_err());
    }

    #[tokio::test]
    async fn test_initiate_shutdown_closes_sessions() {
        let hub = test_hub();
        let (session, _rx) = join(&hub, "alice", None);

        assert!(!hub.is_shutting_down());
        hub.initiate_shutdown();
        assert!(hub.is_shutting_down());
        assert!(session.is_closed());
    }
}
