//! The dispatcher: a shared work queue drained by worker tasks.
//!
//! Every reader feeds one bounded queue; workers look up the handler for the
//! envelope's type and fall back to address-based default routing. Envelopes
//! from one session preserve program order into the queue; there is no order
//! across sessions.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use relay_core::Envelope;

use crate::hub::Hub;
use crate::session::Session;

/// One unit of dispatch work: an inbound envelope and its source session.
pub(crate) struct DispatchItem {
    pub session: Arc<Session>,
    pub envelope: Envelope,
}

impl Hub {
    /// Spawns the dispatcher workers.
    ///
    /// Call once after building the hub; subsequent calls return no handles.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let Some(rx) = self.take_dispatch_rx() else {
            warn!("dispatcher already started");
            return Vec::new();
        };

        let queue = Arc::new(Mutex::new(rx));
        (0..self.config().dispatch_workers.max(1))
            .map(|worker| {
                let hub = self.clone();
                let queue = queue.clone();
                tokio::spawn(worker_loop(hub, queue, worker))
            })
            .collect()
    }

    /// Processes one envelope: registered handler if any, else the default
    /// route, then the after-dispatch hook. Handler errors are logged; the
    /// after hook runs regardless.
    pub async fn process(&self, session: &Arc<Session>, envelope: &Envelope) {
        match self.lookup_handler(&envelope.kind) {
            Some(handler) => {
                if let Err(error) = handler.handle(self, session, envelope).await {
                    warn!(
                        session_id = %session.id(),
                        kind = %envelope.kind,
                        %error,
                        "handler failed"
                    );
                }
            }
            None => self.default_route(session, envelope),
        }

        self.hooks().run_after(session, envelope).await;
    }

    /// Routes an envelope with no registered handler: recipient first, then
    /// channel (sender included), then broadcast to all.
    fn default_route(&self, session: &Arc<Session>, envelope: &Envelope) {
        if let Some(recipient) = envelope.recipient() {
            let delivered = self.send_to_user(recipient, envelope, None);
            debug!(recipient, delivered, message_id = %envelope.id, "default route to user");
        } else if let Some(channel) = envelope.channel() {
            let delivered = self.send_to_channel(channel, envelope, None);
            debug!(channel, delivered, message_id = %envelope.id, "default route to channel");
        } else {
            let delivered = self.broadcast_all(envelope);
            debug!(
                delivered,
                message_id = %envelope.id,
                session_id = %session.id(),
                "default route broadcast"
            );
        }
    }
}

async fn worker_loop(hub: Arc<Hub>, queue: Arc<Mutex<mpsc::Receiver<DispatchItem>>>, worker: usize) {
    let mut shutdown = hub.shutdown_controller().subscribe();
    debug!(worker, "dispatcher worker started");

    loop {
        let item = tokio::select! {
            _ = shutdown.recv() => break,
            item = next_item(&queue) => match item {
                Some(item) => item,
                None => break,
            },
        };
        hub.process(&item.session, &item.envelope).await;
    }

    info!(worker, "dispatcher worker stopped");
}

async fn next_item(queue: &Mutex<mpsc::Receiver<DispatchItem>>) -> Option<DispatchItem> {
    queue.lock().await.recv().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::session::SessionId;
    use relay_core::MessageType;

    fn test_hub() -> Arc<Hub> {
        Hub::builder(HubConfig {
            outbox_capacity: 8,
            ..HubConfig::default()
        })
        .build()
    }

    fn register(hub: &Hub, user: &str) -> (Arc<Session>, mpsc::Receiver<Envelope>) {
        let (session, rx) = Session::new(SessionId::generate(), user, 8);
        hub.topology().register(session.clone()).unwrap();
        (session, rx)
    }

    #[tokio::test]
    async fn test_unknown_type_with_recipient_routes_to_user() {
        let hub = test_hub();
        let (sender, _rx_s) = register(&hub, "alice");
        let (_target, mut rx_t) = register(&hub, "bob");

        let envelope = Envelope::system(MessageType::Other("custom:ping".to_string()))
            .with_recipient("bob");
        hub.process(&sender, &envelope).await;

        let received = rx_t.try_recv().unwrap();
        assert_eq!(received.kind, MessageType::Other("custom:ping".to_string()));
    }

    #[tokio::test]
    async fn test_notification_default_routes_to_channel_including_sender() {
        let hub = test_hub();
        let (sender, mut rx_s) = register(&hub, "alice");
        let (other, mut rx_o) = register(&hub, "bob");
        hub.topology().subscribe(sender.id(), "ops").unwrap();
        hub.topology().subscribe(other.id(), "ops").unwrap();

        let envelope = Envelope::system(MessageType::Notification).with_channel("ops");
        hub.process(&sender, &envelope).await;

        assert!(rx_s.try_recv().is_ok());
        assert!(rx_o.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_bare_envelope_broadcasts_to_all() {
        let hub = test_hub();
        let (sender, mut rx_s) = register(&hub, "alice");
        let (_other, mut rx_o) = register(&hub, "bob");

        let envelope = Envelope::system(MessageType::Event);
        hub.process(&sender, &envelope).await;

        assert!(rx_s.try_recv().is_ok());
        assert!(rx_o.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_workers_drain_the_queue() {
        let hub = test_hub();
        let handles = hub.start();
        assert!(!handles.is_empty());

        let (sender, _rx_s) = register(&hub, "alice");
        let (_target, mut rx_t) = register(&hub, "bob");

        let envelope = Envelope::system(MessageType::Other("x".to_string())).with_recipient("bob");
        hub.enqueue_dispatch(sender.clone(), envelope).await.unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_secs(1), rx_t.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.kind, MessageType::Other("x".to_string()));

        hub.initiate_shutdown();
        for handle in handles {
            let _ = handle.await;
        }
    }

    #[tokio::test]
    async fn test_start_twice_spawns_nothing() {
        let hub = test_hub();
        let first = hub.start();
        let second = hub.start();
        assert!(!first.is_empty());
        assert!(second.is_empty());

        hub.initiate_shutdown();
        for handle in first {
            let _ = handle.await;
        }
    }
}
