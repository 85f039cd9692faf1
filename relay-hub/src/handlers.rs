//! Per-message-type dispatch behavior.
//!
//! The table below is built once at startup. Types without an entry fall
//! through to the dispatcher's default route.
//!
//! | Type | Behavior |
//! |---|---|
//! | `chat`, `chat:group` | channel fan-out, originating session excluded |
//! | `chat:private` | fan-out to every session of the recipient user |
//! | `system:typing` | channel fan-out (sender included) or recipient fan-out |
//! | `system:presence` | join handling plus active-user roster broadcast |
//! | `system:user_joined`, `system:user_left` | logged; hub-synthesized only |
//! | `message:delete` | tombstone fan-out to channel or recipient |
//! | `ack` | logged |

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use relay_core::{Envelope, MessageType, RelayError, Result};

use crate::hub::Hub;
use crate::session::Session;

/// Dispatch behavior for one message type.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one inbound envelope.
    ///
    /// `session` is the originating session. An error drops the envelope and
    /// is logged by the dispatcher; the after-dispatch hook still runs.
    async fn handle(&self, hub: &Hub, session: &Arc<Session>, envelope: &Envelope) -> Result<()>;
}

/// Builds the standard handler table.
pub(crate) fn default_handlers() -> HashMap<MessageType, Arc<dyn MessageHandler>> {
    let mut table: HashMap<MessageType, Arc<dyn MessageHandler>> = HashMap::new();

    // chat and chat:group share group semantics
    let group: Arc<dyn MessageHandler> = Arc::new(GroupChatHandler);
    table.insert(MessageType::Chat, group.clone());
    table.insert(MessageType::GroupChat, group);

    table.insert(MessageType::PrivateChat, Arc::new(PrivateChatHandler));
    table.insert(MessageType::Typing, Arc::new(TypingHandler));
    table.insert(MessageType::Presence, Arc::new(PresenceHandler));

    let user_event: Arc<dyn MessageHandler> = Arc::new(UserEventHandler);
    table.insert(MessageType::UserJoined, user_event.clone());
    table.insert(MessageType::UserLeft, user_event);

    table.insert(MessageType::MessageDelete, Arc::new(DeleteHandler));
    table.insert(MessageType::Ack, Arc::new(AckHandler));
    table
}

/// Group chat: channel fan-out, excluding the originating session (the
/// sender rendered optimistically).
#[derive(Debug, Default)]
pub struct GroupChatHandler;

#[async_trait]
impl MessageHandler for GroupChatHandler {
    async fn handle(&self, hub: &Hub, session: &Arc<Session>, envelope: &Envelope) -> Result<()> {
        let channel = envelope
            .channel()
            .ok_or_else(|| RelayError::ChannelRequired(envelope.kind.clone()))?;

        let delivered = hub.send_to_channel(channel, envelope, Some(session.id()));
        debug!(
            channel,
            delivered,
            sender = %envelope.sender,
            message_id = %envelope.id,
            "group chat relayed"
        );
        Ok(())
    }
}

/// Private chat: fan-out to every session (device) of the recipient user.
/// The originating session never receives an echo.
#[derive(Debug, Default)]
pub struct PrivateChatHandler;

#[async_trait]
impl MessageHandler for PrivateChatHandler {
    async fn handle(&self, hub: &Hub, session: &Arc<Session>, envelope: &Envelope) -> Result<()> {
        let recipient = envelope
            .recipient()
            .ok_or_else(|| RelayError::RecipientRequired(envelope.kind.clone()))?;

        let delivered = hub.send_to_user(recipient, envelope, Some(session.id()));
        debug!(
            recipient,
            delivered,
            sender = %envelope.sender,
            message_id = %envelope.id,
            "private chat relayed"
        );
        Ok(())
    }
}

/// Typing indicator: channel fan-out including the sender (harmless, clients
/// ignore their own), or recipient fan-out. Never persisted, never an error.
#[derive(Debug, Default)]
pub struct TypingHandler;

#[async_trait]
impl MessageHandler for TypingHandler {
    async fn handle(&self, hub: &Hub, _session: &Arc<Session>, envelope: &Envelope) -> Result<()> {
        if let Some(channel) = envelope.channel() {
            hub.send_to_channel(channel, envelope, None);
            debug!(channel, sender = %envelope.sender, "typing indicator");
        } else if let Some(recipient) = envelope.recipient() {
            hub.send_to_user(recipient, envelope, None);
            debug!(recipient, sender = %envelope.sender, "typing indicator");
        }
        Ok(())
    }
}

/// Presence: on `action == "join"` subscribes the session and announces the
/// join, then always broadcasts the channel's active-user roster.
#[derive(Debug, Default)]
pub struct PresenceHandler;

#[async_trait]
impl MessageHandler for PresenceHandler {
    async fn handle(&self, hub: &Hub, session: &Arc<Session>, envelope: &Envelope) -> Result<()> {
        let channel = envelope.channel();

        if envelope.payload_str("action") == Some("join") {
            if let Some(channel) = channel {
                hub.topology().subscribe(session.id(), channel)?;
                info!(
                    channel,
                    user_id = %envelope.sender,
                    session_id = %session.id(),
                    "joined channel"
                );

                let mut joined = Envelope::system(MessageType::UserJoined)
                    .with_channel(channel)
                    .with_payload("user", envelope.sender.clone());
                joined.timestamp = envelope.timestamp;
                hub.send_to_channel(channel, &joined, None);
            }
        }

        if let Some(channel) = channel {
            let users = hub.topology().active_users_of_channel(channel);
            let mut presence = Envelope::system(MessageType::Presence)
                .with_channel(channel)
                .with_payload("users", users);
            presence.timestamp = envelope.timestamp;
            hub.send_to_channel(channel, &presence, None);
        }

        Ok(())
    }
}

/// Inbound `system:user_joined` / `system:user_left`: these are synthesized
/// by the hub; client-originated copies are logged and go nowhere.
#[derive(Debug, Default)]
pub struct UserEventHandler;

#[async_trait]
impl MessageHandler for UserEventHandler {
    async fn handle(&self, _hub: &Hub, session: &Arc<Session>, envelope: &Envelope) -> Result<()> {
        info!(
            kind = %envelope.kind,
            user_id = %session.user_id(),
            session_id = %session.id(),
            "client-originated user event ignored"
        );
        Ok(())
    }
}

/// Message deletion tombstone: forwarded to the implicit audience so clients
/// drop the referenced id from their views.
#[derive(Debug, Default)]
pub struct DeleteHandler;

#[async_trait]
impl MessageHandler for DeleteHandler {
    async fn handle(&self, hub: &Hub, _session: &Arc<Session>, envelope: &Envelope) -> Result<()> {
        if let Some(channel) = envelope.channel() {
            hub.send_to_channel(channel, envelope, None);
            debug!(channel, message_id = %envelope.id, "delete tombstone relayed");
        } else if let Some(recipient) = envelope.recipient() {
            hub.send_to_user(recipient, envelope, None);
            debug!(recipient, message_id = %envelope.id, "delete tombstone relayed");
        }
        Ok(())
    }
}

/// Acknowledgments: logged, no fan-out.
#[derive(Debug, Default)]
pub struct AckHandler;

#[async_trait]
impl MessageHandler for AckHandler {
    async fn handle(&self, _hub: &Hub, _session: &Arc<Session>, envelope: &Envelope) -> Result<()> {
        debug!(message_id = %envelope.id, sender = %envelope.sender, "acknowledgment");
        Ok(())
    }
}
